//! Mapping PostgresCluster notifications to the pgAdmins that must be reconciled.
//!
//! PostgresClusters are not owned by a pgAdmin, so there is no owner reference
//! to follow. Instead the selection of every server group is evaluated again
//! against the current list of pgAdmins, using the same predicate as
//! [`Resolution::select`](super::Resolution::select). Nothing is cached between
//! notifications.

use kube::{runtime::reflector::ObjectRef, ResourceExt as _};
use tracing::warn;

use crate::resources::{PGAdmin, PostgresCluster};

/// The pgAdmins in the namespace of `cluster` that select it.
///
/// Created, updated and deleted clusters are treated alike: a pgAdmin whose
/// configuration lists a deleted cluster must be rebuilt without it.
pub fn pgadmins_for_cluster<'a>(
    cluster: &PostgresCluster,
    pgadmins: impl IntoIterator<Item = &'a PGAdmin>,
) -> Vec<ObjectRef<PGAdmin>> {
    let Some(namespace) = cluster.namespace() else {
        return Vec::new();
    };

    pgadmins
        .into_iter()
        .filter(|pgadmin| pgadmin.namespace().as_deref() == Some(namespace.as_str()))
        .filter(|pgadmin| {
            pgadmin.spec.server_groups.iter().any(|group| {
                group.selects(cluster).unwrap_or_else(|error| {
                    warn!(
                        pgadmin = %pgadmin.name_any(),
                        group = %group.name,
                        "Skipping server group with unusable selector: {error}"
                    );
                    false
                })
            })
        })
        .map(ObjectRef::from_obj)
        .collect()
}
