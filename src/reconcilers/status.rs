//! Writing the status of a PGAdmin back to the API server.

use kube::ResourceExt as _;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::{
    resources::{PGAdmin, PGAdminStatus},
    store::{ObjectKey, ObjectStore},
    Error, Result,
};

/// The JSON merge patch that turns `before` into `after`, or `None` when they are equal.
///
/// Objects are diffed key by key; anything else is replaced whole. Keys that
/// disappeared are sent as `null`.
pub fn merge_diff(before: &Value, after: &Value) -> Option<Value> {
    if before == after {
        return None;
    }

    match (before, after) {
        (Value::Object(before), Value::Object(after)) => {
            let mut patch = Map::new();
            for (key, old) in before {
                match after.get(key) {
                    Some(new) => {
                        if let Some(diff) = merge_diff(old, new) {
                            patch.insert(key.clone(), diff);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                }
            }
            for (key, new) in after {
                if !before.contains_key(key) {
                    patch.insert(key.clone(), new.clone());
                }
            }
            Some(Value::Object(patch))
        }
        _ => Some(after.clone()),
    }
}

/// Patch the status of `pgadmin` if it differs from `before`.
///
/// The patch is pinned to the resource version read during this pass, so a
/// concurrent change to the PGAdmin surfaces as a conflict instead of being
/// overwritten. Returns whether a patch was sent.
pub async fn report_if_changed(
    store: &dyn ObjectStore,
    pgadmin: &PGAdmin,
    before: Option<&PGAdminStatus>,
    field_owner: &str,
) -> Result<bool> {
    let after = pgadmin.status.as_ref();
    if before == after {
        debug!("Status unchanged");
        return Ok(false);
    }

    let to_value = |status: Option<&PGAdminStatus>| match status {
        Some(status) => serde_json::to_value(status),
        None => Ok(json!({})),
    };
    let diff = to_value(before)
        .and_then(|before| Ok(merge_diff(&before, &to_value(after)?)))
        .map_err(|e| Error::StatusWrite(Box::new(e.into())))?;

    // Equal after serialization, e.g. an empty status replacing a missing one
    let Some(diff) = diff else {
        return Ok(false);
    };

    let patch = json!({
        "metadata": { "resourceVersion": pgadmin.resource_version() },
        "status": diff,
    });
    let write = async {
        let key = ObjectKey::of(pgadmin)?;
        store.patch_status(&key, &patch, field_owner).await
    };
    write.await.map_err(|e| {
        warn!("Failed to patch status of {}: {e}", pgadmin.name_any());
        Error::StatusWrite(Box::new(e))
    })?;

    debug!("Patched status");
    Ok(true)
}
