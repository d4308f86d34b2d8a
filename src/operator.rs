use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::{
    api::{
        apps::v1::StatefulSet,
        core::v1::{ConfigMap, PersistentVolumeClaim, Secret},
    },
    NamespaceResourceScope,
};
use kube::{
    api::ListParams,
    runtime::{
        controller::Action,
        events::{Event, EventType, Recorder, Reporter},
        watcher::Config,
        Controller,
    },
    Api, Client, Resource,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, field, info, instrument, warn, Span};

use crate::{
    config::OperatorConfig,
    reconcilers::{self, watch::pgadmins_for_cluster, Context},
    resources::{PGAdmin, PostgresCluster},
    store::{KubeStore, ObjectKey},
    telemetry, Error, Metrics, Result,
};

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "pgadmin-operator".into(),
        }
    }
}
impl Diagnostics {
    pub fn recorder(&self, client: Client, pgadmin: &PGAdmin) -> Recorder {
        Recorder::new(client, self.reporter.clone(), pgadmin.object_ref(&()))
    }
}

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

/// State wrapper around the controller outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    fn to_context(
        &self,
        client: Client,
        config: &OperatorConfig,
    ) -> Result<Arc<ControllerContext>, anyhow::Error> {
        Ok(Arc::new(ControllerContext {
            reconciler: Context {
                store: Arc::new(KubeStore::new(client.clone(), config.request_timeout())),
                images: Arc::new(config.image_resolver()),
                field_owner: config.field_owner.clone(),
            },
            client,
            metrics: Metrics::default().register(&self.registry)?,
            diagnostics: self.diagnostics.clone(),
        }))
    }
}

/// Everything a reconciliation started by the controller has access to
struct ControllerContext {
    /// Dependencies of the reconciliation pipeline
    reconciler: Context,
    /// Kubernetes client, used for events
    client: Client,
    /// Prometheus metrics
    metrics: Metrics,
    /// Diagnostics read by the web server
    diagnostics: Arc<RwLock<Diagnostics>>,
}

pub struct PGAdminController {
    state: State,
}

impl PGAdminController {
    pub fn new(state: State) -> Self {
        Self { state }
    }

    /// Initialize the controller and shared state (given the crd is installed)
    pub async fn run(self, config: OperatorConfig) -> Result<(), anyhow::Error> {
        // Get a k8s client for communicating with the cluster
        let client = Client::try_default().await?;

        // Create fetchers for everything we watch, optionally limited to one namespace
        let pgadmins = scoped::<PGAdmin>(&client, config.namespace.as_deref());
        let clusters = scoped::<PostgresCluster>(&client, config.namespace.as_deref());

        // Test that we can actually query for our CRDs (a.k.a. they are installed)
        if let Err(e) = pgadmins.list(&ListParams::default().limit(1)).await {
            error!("CRD is not queryable; {e:?}. Is the CRD installed?");
            info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            return Err(e.into());
        }

        // Create a new k8s controller for our CRD resources
        let watching_config = Config::default().any_semantic();
        let controller = Controller::new(pgadmins, watching_config.clone());

        // PostgresClusters are not owned, so map them through the PGAdmins we already know of
        let known = controller.store();

        controller
            .shutdown_on_signal()
            .owns(scoped::<Secret>(&client, config.namespace.as_deref()), watching_config.clone())
            .owns(scoped::<ConfigMap>(&client, config.namespace.as_deref()), watching_config.clone())
            .owns(
                scoped::<PersistentVolumeClaim>(&client, config.namespace.as_deref()),
                watching_config.clone(),
            )
            .owns(
                scoped::<StatefulSet>(&client, config.namespace.as_deref()),
                watching_config.clone(),
            )
            .watches(clusters, watching_config, move |cluster| {
                let pgadmins = known.state();
                pgadmins_for_cluster(&cluster, pgadmins.iter().map(Arc::as_ref))
            })
            .run(reconcile, error_policy, self.state.to_context(client, &config)?)
            .filter_map(|x| async move { x.ok() })
            .for_each(|_| futures::future::ready(()))
            .await;

        Ok(())
    }
}

fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Main reconciler for PGAdmins
#[instrument(skip(ctx, pgadmin), fields(trace_id))]
async fn reconcile(pgadmin: Arc<PGAdmin>, ctx: Arc<ControllerContext>) -> Result<Action> {
    // Add some tracing for debugging's sake
    let trace_id = telemetry::get_trace_id();

    // Take some metrics to see the average reconcile time
    Span::current().record("trace_id", &field::display(&trace_id));
    let _timer = ctx.metrics.count_and_measure();
    ctx.diagnostics.write().await.last_event = Utc::now();

    // Reconcile against a fresh copy, the cached one may be stale
    let key = ObjectKey::of(pgadmin.as_ref())?;
    info!(r#"Starting PGAdmin reconciliation for "{key}""#);
    let result = reconcilers::reconcile(&key, &ctx.reconciler).await;

    if let Err(error) = &result {
        let recorder = ctx
            .diagnostics
            .read()
            .await
            .recorder(ctx.client.clone(), &pgadmin);
        let published = recorder
            .publish(Event {
                type_: EventType::Warning,
                reason: "ReconcileFailed".into(),
                note: Some(error.to_string()),
                action: "Reconciling".into(),
                secondary: None,
            })
            .await;
        if let Err(e) = published {
            warn!("Failed to publish event for {key}: {e}");
        }
    }

    result
}

/// Error handler for failed reconciliations
fn error_policy(pgadmin: Arc<PGAdmin>, error: &Error, ctx: Arc<ControllerContext>) -> Action {
    error!("reconcile failed: {:?}", error);
    ctx.metrics.reconcile_failure(&pgadmin, error);
    requeue_for(error)
}

/// How long to wait before retrying after `error`.
///
/// A spec that failed validation is only retried once it changes.
fn requeue_for(error: &Error) -> Action {
    if error.is_validation() {
        Action::await_change()
    } else if error.is_conflict() {
        Action::requeue(Duration::from_secs(1))
    } else {
        Action::requeue(Duration::from_secs(5))
    }
}
