//! Narrow access to the Kubernetes object graph.
//!
//! The reconciler never talks to the API server directly; everything it reads
//! or writes goes through [`ObjectStore`], which keeps the pipeline testable
//! without a cluster.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::{
    apps::v1::StatefulSet,
    core::v1::{ConfigMap, PersistentVolumeClaim, Secret},
};
use kube::{core::ObjectMeta, Resource, ResourceExt as _};

#[cfg(test)]
use mockall::automock;

use crate::{
    resources::{PGAdmin, PostgresCluster},
    Error, Result,
};

mod kube_store;
pub use kube_store::KubeStore;

#[cfg(test)]
pub(crate) mod memory;

/// Namespace and name of an object
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The key of a namespaced object.
    pub fn of<K: Resource>(object: &K) -> Result<Self> {
        let name = object.name_any();
        let namespace = object
            .namespace()
            .ok_or_else(|| Error::IllegalPGAdmin(name.clone(), "missing namespace".into()))?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// An object derived from a PGAdmin, one variant per dependent kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Dependent {
    Credentials(Secret),
    Configuration(ConfigMap),
    DataVolume(PersistentVolumeClaim),
    Workload(StatefulSet),
}

impl Dependent {
    pub fn kind(&self) -> &'static str {
        match self {
            Dependent::Credentials(_) => "Secret",
            Dependent::Configuration(_) => "ConfigMap",
            Dependent::DataVolume(_) => "PersistentVolumeClaim",
            Dependent::Workload(_) => "StatefulSet",
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Dependent::Credentials(o) => o.meta(),
            Dependent::Configuration(o) => o.meta(),
            Dependent::DataVolume(o) => o.meta(),
            Dependent::Workload(o) => o.meta(),
        }
    }

    pub fn key(&self) -> Result<ObjectKey> {
        let meta = self.meta();
        match (&meta.namespace, &meta.name) {
            (Some(namespace), Some(name)) => Ok(ObjectKey::new(namespace, name)),
            _ => Err(Error::IllegalPGAdmin(
                meta.name.clone().unwrap_or_default(),
                format!("{} is missing a name or namespace", self.kind()),
            )),
        }
    }
}

/// Typed operations on the objects this operator reads and writes.
///
/// Lookups return `None` for objects that do not exist. Writes carry a field
/// owner so that other writers of the same objects keep their fields.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get a PGAdmin by namespace and name
    async fn get_pgadmin(&self, key: &ObjectKey) -> Result<Option<PGAdmin>>;

    /// Get a Secret by namespace and name
    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>>;

    /// List every PostgresCluster in a namespace
    async fn list_postgres_clusters(&self, namespace: &str) -> Result<Vec<PostgresCluster>>;

    /// Create or update a dependent with server-side apply, returning what the server stored
    async fn apply(&self, dependent: Dependent, field_owner: &str) -> Result<Dependent>;

    /// Merge `patch` into the status subresource of a PGAdmin
    ///
    /// The patch includes `metadata.resourceVersion`, so a stale writer gets a
    /// conflict instead of overwriting a newer status.
    async fn patch_status(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
        field_owner: &str,
    ) -> Result<()>;
}
