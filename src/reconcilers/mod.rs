use std::sync::Arc;

use async_trait::async_trait;
use kube::{runtime::controller::Action, CustomResourceExt, ResourceExt};

use crate::{config::ImageResolver, store::ObjectStore, Error};

pub mod pgadmin;
pub mod resolver;
pub mod status;
pub mod watch;

pub use pgadmin::reconcile;
pub use resolver::Resolution;

/// The context passed around
#[derive(Clone)]
pub struct Context {
    /// Access to the object graph
    pub store: Arc<dyn ObjectStore>,

    /// Strategy for choosing container images
    pub images: Arc<dyn ImageResolver>,

    /// Field manager for every write made by the reconciler
    pub field_owner: String,
}

/// A resource that can be reconciled by a controller
#[async_trait]
pub(crate) trait Reconcile
where
    Self: CustomResourceExt + ResourceExt,
{
    /// Attempt to reconcile a freshly fetched resource, updating its status in place
    async fn reconcile(&mut self, context: &Context) -> Result<Action, Error>;

    /// Attempt to deploy all necessary sub-resources for this CRD.
    async fn deploy_resources(&self, context: &Context) -> Result<(), Error>;
}
