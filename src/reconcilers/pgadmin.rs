use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::{runtime::controller::Action, ResourceExt as _};
use tracing::{debug, info, warn};

use crate::{
    builders::{
        configuration, credentials, credentials_name, data_volume, existing_password,
        generate_password, workload,
    },
    resources::{PGAdmin, CONDITION_RECONCILED},
    store::{Dependent, ObjectKey},
    Error, Result,
};

use super::{resolver::resolve, status::report_if_changed, Context, Reconcile};

/// Reconcile the PGAdmin named by `key`.
///
/// A PGAdmin that no longer exists needs no work: its dependents are removed
/// by garbage collection through their owner references.
pub async fn reconcile(key: &ObjectKey, context: &Context) -> Result<Action> {
    let Some(mut pgadmin) = context.store.get_pgadmin(key).await? else {
        info!(r#"PGAdmin "{key}" is gone, nothing to do"#);
        return Ok(Action::await_change());
    };

    pgadmin.reconcile(context).await
}

#[async_trait]
impl Reconcile for PGAdmin {
    async fn reconcile(&mut self, context: &Context) -> Result<Action, Error> {
        let before = self.status.clone();
        self.apply_defaults();

        let outcome = self.deploy_resources(context).await;
        self.record_outcome(outcome.as_ref().err());

        let reported =
            report_if_changed(context.store.as_ref(), self, before.as_ref(), &context.field_owner)
                .await;

        match (outcome, reported) {
            (Err(error), Ok(_)) => Err(error),
            (Err(error), Err(_)) => Err(Error::Unreported(Box::new(error))),
            (Ok(()), Err(error)) => Err(error),
            (Ok(()), Ok(_)) => {
                info!(r#"Reconciled PGAdmin "{}""#, self.name_any());
                Ok(Action::await_change())
            }
        }
    }

    async fn deploy_resources(&self, context: &Context) -> Result<(), Error> {
        // Nothing is built unless the whole pass can be
        let image = context
            .images
            .resolve_image(&self.spec)
            .ok_or_else(|| Error::MissingImage(self.name_any()))?;
        self.validate()?;

        let namespace = self
            .namespace()
            .ok_or_else(|| Error::IllegalPGAdmin(self.name_any(), "missing namespace".into()))?;
        let apply = |dependent: Dependent| async move {
            debug!(
                r#"Applying {} "{}""#,
                dependent.kind(),
                dependent.meta().name.as_deref().unwrap_or_default()
            );
            context.store.apply(dependent, &context.field_owner).await
        };

        let existing = context
            .store
            .get_secret(&ObjectKey::new(&namespace, credentials_name(self)))
            .await?;
        let password = existing_password(existing.as_ref()).unwrap_or_else(generate_password);
        apply(Dependent::Credentials(credentials(self, password)?)).await?;

        let resolution = resolve(self, context.store.as_ref()).await?;

        let configmap = configuration(self, &resolution)?;
        apply(Dependent::Configuration(configmap.clone())).await?;

        let claim = data_volume(self)?;
        apply(Dependent::DataVolume(claim.clone())).await?;

        let statefulset = workload(self, &image, &configmap, &claim)?;
        apply(Dependent::Workload(statefulset)).await?;

        Ok(())
    }
}

impl PGAdmin {
    /// Describe the outcome of a pass in the status.
    ///
    /// The observed generation only moves when every dependent was applied.
    fn record_outcome(&mut self, error: Option<&Error>) {
        let generation = self.metadata.generation;
        let status = self.status.get_or_insert_with(Default::default);

        let (state, reason, message) = match error {
            None => {
                status.observed_generation = generation;
                ("True", "Succeeded", String::new())
            }
            Some(error) => {
                let name = self.metadata.name.as_deref().unwrap_or_default();
                warn!(r#"Reconciling PGAdmin "{name}" failed: {error}"#);
                ("False", error.reason(), error.to_string())
            }
        };

        status.set_condition(Condition {
            last_transition_time: Time(Utc::now()),
            message,
            observed_generation: generation,
            reason: reason.into(),
            status: state.into(),
            type_: CONDITION_RECONCILED.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use k8s_openapi::api::core::v1::ConfigMap;
    use serde_json::Value;

    use super::*;
    use crate::{
        builders::{
            fixtures::{by_name, cluster, pgadmin},
            SHARED_CLUSTERS_KEY,
        },
        config::ImageDefaults,
        store::{memory::MemoryStore, MockObjectStore, ObjectStore},
    };

    const IMAGE: &str = "registry.example/pgadmin4:8.0";

    fn context(store: Arc<dyn ObjectStore>, image: Option<&str>) -> Context {
        Context {
            store,
            images: Arc::new(ImageDefaults {
                standalone_pgadmin: image.map(String::from),
            }),
            field_owner: "test-owner".into(),
        }
    }

    fn alpha() -> ObjectKey {
        ObjectKey::new("ns", "alpha")
    }

    fn seeded(groups: Vec<crate::resources::ServerGroup>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.insert_pgadmin(pgadmin("alpha", groups));
        store.insert_cluster(cluster("db1", &[]));
        store.insert_cluster(cluster("db2", &[]));
        store
    }

    fn shared_clusters(store: &MemoryStore) -> Value {
        let key = ObjectKey::new("ns", "alpha-config");
        let Some(Dependent::Configuration(ConfigMap { data: Some(data), .. })) =
            store.dependent("ConfigMap", &key)
        else {
            panic!("configuration was not applied");
        };
        serde_json::from_str(&data[SHARED_CLUSTERS_KEY]).unwrap()
    }

    fn server_names(store: &MemoryStore) -> Vec<String> {
        shared_clusters(store)["Servers"]
            .as_object()
            .unwrap()
            .values()
            .map(|server| server["Name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn missing_pgadmin_is_not_an_error() {
        let mut store = MockObjectStore::new();
        store
            .expect_get_pgadmin()
            .times(1)
            .returning(|_| Ok(None));
        store.expect_apply().never();
        store.expect_patch_status().never();

        let action = reconcile(&alpha(), &context(Arc::new(store), Some(IMAGE)))
            .await
            .unwrap();
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn first_pass_applies_every_dependent_in_order() {
        let mut store = MockObjectStore::new();
        let mut sequence = mockall::Sequence::new();
        store
            .expect_get_pgadmin()
            .returning(|_| Ok(Some(pgadmin("alpha", vec![by_name("g", "db1")]))));
        store.expect_get_secret().returning(|_| Ok(None));
        store
            .expect_list_postgres_clusters()
            .returning(|_| Ok(vec![cluster("db1", &[])]));
        for kind in ["Secret", "ConfigMap", "PersistentVolumeClaim", "StatefulSet"] {
            store
                .expect_apply()
                .withf(move |dependent, owner| dependent.kind() == kind && owner == "test-owner")
                .times(1)
                .in_sequence(&mut sequence)
                .returning(|dependent, _| Ok(dependent));
        }
        store
            .expect_patch_status()
            .withf(|_, patch, _| patch["status"]["observedGeneration"] == 1)
            .times(1)
            .returning(|_, _, _| Ok(()));

        reconcile(&alpha(), &context(Arc::new(store), Some(IMAGE)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn second_pass_is_a_no_op() {
        let store = seeded(vec![by_name("a", "db1"), by_name("b", "db2")]);
        let ctx = context(store.clone(), Some(IMAGE));

        reconcile(&alpha(), &ctx).await.unwrap();
        assert_eq!(store.dependent_count(), 4);
        assert_eq!(store.writes(), 4);
        assert_eq!(store.status_patches().len(), 1);

        reconcile(&alpha(), &ctx).await.unwrap();
        assert_eq!(store.writes(), 4);
        assert_eq!(store.status_patches().len(), 1);
        assert_eq!(store.pgadmin(&alpha()).status.unwrap().observed_generation, Some(1));
    }

    #[tokio::test]
    async fn password_survives_later_passes() {
        let store = seeded(vec![]);
        let ctx = context(store.clone(), Some(IMAGE));
        let secret = ObjectKey::new("ns", "alpha-secret");

        reconcile(&alpha(), &ctx).await.unwrap();
        let first = store.dependent("Secret", &secret);

        store.update_pgadmin(&alpha(), |p| p.spec.priority_class_name = Some("high".into()));
        reconcile(&alpha(), &ctx).await.unwrap();
        assert_eq!(store.dependent("Secret", &secret), first);
    }

    #[tokio::test]
    async fn conflicts_converge_on_a_later_pass() {
        let store = seeded(vec![by_name("a", "db1")]);
        let ctx = context(store.clone(), Some(IMAGE));
        store.conflict_on_apply(1);

        let error = reconcile(&alpha(), &ctx).await.unwrap_err();
        assert!(error.is_conflict());
        assert_eq!(store.dependent_count(), 0);
        let status = store.pgadmin(&alpha()).status.unwrap();
        assert_eq!(status.observed_generation, None);
        assert_eq!(status.condition(CONDITION_RECONCILED).unwrap().reason, "Conflict");

        reconcile(&alpha(), &ctx).await.unwrap();
        assert_eq!(store.dependent_count(), 4);
        let status = store.pgadmin(&alpha()).status.unwrap();
        assert_eq!(status.observed_generation, Some(1));
        assert_eq!(status.condition(CONDITION_RECONCILED).unwrap().status, "True");
    }

    #[tokio::test]
    async fn deleted_cluster_is_dropped_from_configuration() {
        let store = seeded(vec![by_name("a", "db1"), by_name("b", "db2")]);
        let ctx = context(store.clone(), Some(IMAGE));

        reconcile(&alpha(), &ctx).await.unwrap();
        assert_eq!(server_names(&store), ["db1", "db2"]);

        store.update_pgadmin(&alpha(), |p| {
            p.spec.priority_class_name = Some("high".into());
        });
        let db2 = store.delete_cluster(&ObjectKey::new("ns", "db2"));
        let pgadmins = [store.pgadmin(&alpha())];
        let mapped = crate::reconcilers::watch::pgadmins_for_cluster(&db2, &pgadmins);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].name, "alpha");
        assert_eq!(mapped[0].namespace.as_deref(), Some("ns"));

        reconcile(&alpha(), &ctx).await.unwrap();
        assert_eq!(server_names(&store), ["db1"]);
        assert_eq!(store.pgadmin(&alpha()).status.unwrap().observed_generation, Some(2));
    }

    #[tokio::test]
    async fn missing_image_fails_before_any_dependent() {
        let store = seeded(vec![by_name("a", "db1")]);
        let ctx = context(store.clone(), None);

        let error = reconcile(&alpha(), &ctx).await.unwrap_err();
        assert!(matches!(error, Error::MissingImage(_)));
        assert!(error.is_validation());
        assert_eq!(store.applies(), 0);

        let patches = store.status_patches();
        assert_eq!(patches.len(), 1);
        let status = store.pgadmin(&alpha()).status.unwrap();
        let condition = status.condition(CONDITION_RECONCILED).unwrap();
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason, "MissingImage");
        assert_eq!(status.observed_generation, None);
    }

    #[tokio::test]
    async fn failed_pass_keeps_previous_observed_generation() {
        let store = seeded(vec![by_name("a", "db1")]);
        reconcile(&alpha(), &context(store.clone(), Some(IMAGE)))
            .await
            .unwrap();

        store.update_pgadmin(&alpha(), |p| p.spec.image = Some(String::new()));
        let error = reconcile(&alpha(), &context(store.clone(), None))
            .await
            .unwrap_err();
        assert!(error.is_validation());
        assert_eq!(store.pgadmin(&alpha()).status.unwrap().observed_generation, Some(1));
    }

    #[tokio::test]
    async fn status_write_failure_fails_a_good_pass() {
        let store = seeded(vec![by_name("a", "db1")]);
        store.fail_status_patches(true);

        let error = reconcile(&alpha(), &context(store.clone(), Some(IMAGE)))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::StatusWrite(_)));
        assert_eq!(store.dependent_count(), 4);
        assert!(store.pgadmin(&alpha()).status.is_none());
    }

    #[tokio::test]
    async fn pipeline_error_wins_over_status_write_failure() {
        let store = seeded(vec![]);
        store.fail_status_patches(true);

        let error = reconcile(&alpha(), &context(store.clone(), None))
            .await
            .unwrap_err();
        let Error::Unreported(cause) = &error else {
            panic!("expected an unreported failure, got {error:?}");
        };
        assert!(matches!(**cause, Error::MissingImage(_)));
        assert_eq!(error.reason(), "MissingImage");
        // Retried until the failure condition is written
        assert!(!error.is_validation());

        store.fail_status_patches(false);
        let error = reconcile(&alpha(), &context(store.clone(), None))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::MissingImage(_)));
        let status = store.pgadmin(&alpha()).status.unwrap();
        assert_eq!(status.condition(CONDITION_RECONCILED).unwrap().reason, "MissingImage");
    }

    /// Bumps the stored PGAdmin right after every read, like a concurrent writer.
    struct ChangedAfterRead(Arc<MemoryStore>);

    #[async_trait]
    impl ObjectStore for ChangedAfterRead {
        async fn get_pgadmin(&self, key: &ObjectKey) -> Result<Option<crate::resources::PGAdmin>> {
            let pgadmin = self.0.get_pgadmin(key).await?;
            if pgadmin.is_some() {
                self.0.update_pgadmin(key, |p| p.spec.priority_class_name = Some("other".into()));
            }
            Ok(pgadmin)
        }

        async fn get_secret(&self, key: &ObjectKey) -> Result<Option<k8s_openapi::api::core::v1::Secret>> {
            self.0.get_secret(key).await
        }

        async fn list_postgres_clusters(
            &self,
            namespace: &str,
        ) -> Result<Vec<crate::resources::PostgresCluster>> {
            self.0.list_postgres_clusters(namespace).await
        }

        async fn apply(&self, dependent: Dependent, field_owner: &str) -> Result<Dependent> {
            self.0.apply(dependent, field_owner).await
        }

        async fn patch_status(&self, key: &ObjectKey, patch: &Value, field_owner: &str) -> Result<()> {
            self.0.patch_status(key, patch, field_owner).await
        }
    }

    #[tokio::test]
    async fn stale_status_is_not_written() {
        let store = seeded(vec![by_name("a", "db1")]);
        let racing = Arc::new(ChangedAfterRead(store.clone()));

        let error = reconcile(&alpha(), &context(racing, Some(IMAGE)))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::StatusWrite(_)));
        assert!(error.is_conflict());

        let stored = store.pgadmin(&alpha());
        assert_eq!(stored.metadata.generation, Some(2));
        assert!(stored.status.is_none());
        assert_eq!(store.status_patches().len(), 1);
    }

    #[tokio::test]
    async fn invalid_groups_are_reported_in_status() {
        let store = seeded(vec![by_name("a", "db1"), by_name("a", "db2")]);

        let error = reconcile(&alpha(), &context(store.clone(), Some(IMAGE)))
            .await
            .unwrap_err();
        assert!(error.is_validation());
        assert_eq!(store.applies(), 0);
        let status = store.pgadmin(&alpha()).status.unwrap();
        assert_eq!(
            status.condition(CONDITION_RECONCILED).unwrap().reason,
            "InvalidSpec"
        );
    }
}
