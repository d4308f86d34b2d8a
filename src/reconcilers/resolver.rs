//! Loading the PostgresClusters a pgAdmin refers to.

use std::collections::BTreeMap;

use kube::ResourceExt as _;
use tracing::debug;

use crate::{
    resources::{PGAdmin, PostgresCluster, ServerGroup},
    store::ObjectStore,
    Error, Result,
};

/// The PostgresClusters selected by each server group of one pgAdmin,
/// captured once per reconciliation.
///
/// Groups and the clusters within them are ordered by name, so anything
/// rendered from a resolution does not depend on listing order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    groups: BTreeMap<String, Vec<PostgresCluster>>,
}

impl Resolution {
    /// Apply the selection of every group to `clusters`.
    pub fn select(groups: &[ServerGroup], clusters: &[PostgresCluster]) -> Result<Self> {
        let mut resolution = Self::default();

        for group in groups {
            let mut selected = Vec::new();
            for cluster in clusters {
                if group.selects(cluster)? {
                    selected.push(cluster.clone());
                }
            }
            selected.sort_by_key(|c| c.name_any());
            resolution.groups.insert(group.name.clone(), selected);
        }

        Ok(resolution)
    }

    /// Every (group name, cluster) pair, in rendering order.
    pub fn clusters(&self) -> impl Iterator<Item = (&str, &PostgresCluster)> {
        self.groups
            .iter()
            .flat_map(|(group, clusters)| clusters.iter().map(move |c| (group.as_str(), c)))
    }

    pub fn group(&self, name: &str) -> Option<&[PostgresCluster]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load the clusters referenced by `pgadmin` from its namespace.
///
/// Skips the list call entirely when there are no server groups.
pub async fn resolve(pgadmin: &PGAdmin, store: &dyn ObjectStore) -> Result<Resolution> {
    if pgadmin.spec.server_groups.is_empty() {
        return Ok(Resolution::default());
    }

    let namespace = pgadmin
        .namespace()
        .ok_or_else(|| Error::IllegalPGAdmin(pgadmin.name_any(), "missing namespace".into()))?;
    let clusters = store.list_postgres_clusters(&namespace).await?;
    let resolution = Resolution::select(&pgadmin.spec.server_groups, &clusters)?;

    debug!(
        clusters = resolution.len(),
        listed = clusters.len(),
        "Resolved PostgresClusters"
    );
    Ok(resolution)
}
