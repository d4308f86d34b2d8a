//! In-memory [`ObjectStore`] for exercising whole reconciliation passes.

use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{error::ErrorResponse, ResourceExt as _};
use serde_json::{Map, Value};

use super::{Dependent, ObjectKey, ObjectStore};
use crate::{
    resources::{PGAdmin, PostgresCluster},
    Error, Result,
};

#[derive(Default)]
struct Inner {
    pgadmins: BTreeMap<ObjectKey, PGAdmin>,
    clusters: BTreeMap<ObjectKey, PostgresCluster>,
    dependents: BTreeMap<(&'static str, ObjectKey), Dependent>,
    applies: usize,
    writes: usize,
    status_patches: Vec<Value>,
    conflicts_on_apply: usize,
    fail_status_patches: bool,
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    inner: Mutex<Inner>,
}

fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: format!("{reason} from memory store"),
        reason: reason.into(),
        code,
    })
}

/// JSON merge patch (RFC 7386)
fn merge(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

impl MemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn insert_pgadmin(&self, pgadmin: PGAdmin) {
        let key = ObjectKey::of(&pgadmin).unwrap();
        self.lock().pgadmins.insert(key, pgadmin);
    }

    /// Change the spec the way an API client would: bumping generation and resource version.
    pub fn update_pgadmin(&self, key: &ObjectKey, change: impl FnOnce(&mut PGAdmin)) {
        let mut inner = self.lock();
        let pgadmin = inner.pgadmins.get_mut(key).unwrap();
        change(pgadmin);
        pgadmin.metadata.generation = Some(pgadmin.metadata.generation.unwrap_or(0) + 1);
        bump(&mut pgadmin.metadata.resource_version);
    }

    pub fn pgadmin(&self, key: &ObjectKey) -> PGAdmin {
        self.lock().pgadmins[key].clone()
    }

    pub fn insert_cluster(&self, cluster: PostgresCluster) {
        let key = ObjectKey::of(&cluster).unwrap();
        self.lock().clusters.insert(key, cluster);
    }

    pub fn delete_cluster(&self, key: &ObjectKey) -> PostgresCluster {
        self.lock().clusters.remove(key).unwrap()
    }

    pub fn dependent(&self, kind: &'static str, key: &ObjectKey) -> Option<Dependent> {
        self.lock().dependents.get(&(kind, key.clone())).cloned()
    }

    pub fn dependent_count(&self) -> usize {
        self.lock().dependents.len()
    }

    /// Number of apply calls that changed a stored object
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    pub fn applies(&self) -> usize {
        self.lock().applies
    }

    pub fn status_patches(&self) -> Vec<Value> {
        self.lock().status_patches.clone()
    }

    /// Answer the next `count` applies with 409 Conflict
    pub fn conflict_on_apply(&self, count: usize) {
        self.lock().conflicts_on_apply = count;
    }

    pub fn fail_status_patches(&self, fail: bool) {
        self.lock().fail_status_patches = fail;
    }
}

fn bump(resource_version: &mut Option<String>) {
    let next = resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    *resource_version = Some(next.to_string());
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_pgadmin(&self, key: &ObjectKey) -> Result<Option<PGAdmin>> {
        Ok(self.lock().pgadmins.get(key).cloned())
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>> {
        Ok(match self.dependent("Secret", key) {
            Some(Dependent::Credentials(secret)) => Some(secret),
            _ => None,
        })
    }

    async fn list_postgres_clusters(&self, namespace: &str) -> Result<Vec<PostgresCluster>> {
        Ok(self
            .lock()
            .clusters
            .values()
            .filter(|c| c.namespace().as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn apply(&self, dependent: Dependent, _field_owner: &str) -> Result<Dependent> {
        let key = (dependent.kind(), dependent.key()?);
        let mut inner = self.lock();
        inner.applies += 1;

        if inner.conflicts_on_apply > 0 {
            inner.conflicts_on_apply -= 1;
            return Err(api_error(409, "Conflict").into());
        }

        if inner.dependents.get(&key) != Some(&dependent) {
            inner.writes += 1;
            inner.dependents.insert(key, dependent.clone());
        }
        Ok(dependent)
    }

    async fn patch_status(&self, key: &ObjectKey, patch: &Value, _field_owner: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.status_patches.push(patch.clone());

        if inner.fail_status_patches {
            return Err(api_error(503, "ServiceUnavailable").into());
        }

        let pgadmin = inner
            .pgadmins
            .get_mut(key)
            .ok_or_else(|| Error::from(api_error(404, "NotFound")))?;

        let expected = patch.pointer("/metadata/resourceVersion").and_then(Value::as_str);
        if expected.is_some() && expected != pgadmin.metadata.resource_version.as_deref() {
            return Err(api_error(409, "Conflict").into());
        }

        let mut object = serde_json::to_value(&*pgadmin)?;
        if let Some(status) = patch.get("status") {
            merge(&mut object, &serde_json::json!({ "status": status }));
        }
        *pgadmin = serde_json::from_value(object)?;
        bump(&mut pgadmin.metadata.resource_version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::merge;

    #[test]
    fn merge_patch_semantics() {
        let mut target = json!({ "a": 1, "b": { "c": 2, "d": 3 } });
        merge(&mut target, &json!({ "a": null, "b": { "c": 4 }, "e": [1] }));
        assert_eq!(target, json!({ "b": { "c": 4, "d": 3 }, "e": [1] }));
    }
}
