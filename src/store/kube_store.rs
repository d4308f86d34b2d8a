use std::{fmt::Debug, future::Future, time::Duration};

use async_trait::async_trait;
use k8s_openapi::{api::core::v1::Secret, NamespaceResourceScope};
use kube::{
    api::{ListParams, Patch, PatchParams},
    Api, Client, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::{Dependent, ObjectKey, ObjectStore};
use crate::{
    resources::{PGAdmin, PostgresCluster},
    Error, Result,
};

/// [`ObjectStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    timeout: Duration,
}

impl KubeStore {
    /// Every request made through this store fails with [`Error::Timeout`]
    /// once `timeout` has elapsed.
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn apply_object<K>(&self, object: K, field_owner: &str) -> Result<K>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
        <K as Resource>::DynamicType: Default,
    {
        let meta = object.meta();
        let (Some(name), Some(namespace)) = (meta.name.clone(), meta.namespace.clone()) else {
            return Err(Error::IllegalPGAdmin(
                meta.name.clone().unwrap_or_default(),
                "cannot apply an object without name and namespace".into(),
            ));
        };

        debug!(r#"Applying {} "{namespace}/{name}""#, K::kind(&Default::default()));
        let params = PatchParams::apply(field_owner).force();
        with_deadline(
            self.timeout,
            self.api::<K>(&namespace)
                .patch(&name, &params, &Patch::Apply(&object)),
        )
        .await
    }
}

/// Run an API request, giving up after `timeout`.
pub(crate) async fn with_deadline<T>(
    timeout: Duration,
    request: impl Future<Output = Result<T, kube::Error>>,
) -> Result<T> {
    tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| Error::Timeout(timeout))?
        .map_err(Error::from)
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_pgadmin(&self, key: &ObjectKey) -> Result<Option<PGAdmin>> {
        let api = self.api::<PGAdmin>(&key.namespace);
        with_deadline(self.timeout, api.get_opt(&key.name)).await
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>> {
        let api = self.api::<Secret>(&key.namespace);
        with_deadline(self.timeout, api.get_opt(&key.name)).await
    }

    async fn list_postgres_clusters(&self, namespace: &str) -> Result<Vec<PostgresCluster>> {
        let api = self.api::<PostgresCluster>(namespace);
        let list = with_deadline(self.timeout, api.list(&ListParams::default())).await?;
        Ok(list.items)
    }

    async fn apply(&self, dependent: Dependent, field_owner: &str) -> Result<Dependent> {
        Ok(match dependent {
            Dependent::Credentials(o) => {
                Dependent::Credentials(self.apply_object(o, field_owner).await?)
            }
            Dependent::Configuration(o) => {
                Dependent::Configuration(self.apply_object(o, field_owner).await?)
            }
            Dependent::DataVolume(o) => {
                Dependent::DataVolume(self.apply_object(o, field_owner).await?)
            }
            Dependent::Workload(o) => Dependent::Workload(self.apply_object(o, field_owner).await?),
        })
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
        field_owner: &str,
    ) -> Result<()> {
        let api = self.api::<PGAdmin>(&key.namespace);
        let params = PatchParams {
            field_manager: Some(field_owner.into()),
            ..Default::default()
        };
        with_deadline(
            self.timeout,
            api.patch_status(&key.name, &params, &Patch::Merge(patch)),
        )
        .await?;
        Ok(())
    }
}
