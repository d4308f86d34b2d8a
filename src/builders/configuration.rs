use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt as _;
use serde_json::{json, Map, Value};

use super::{merged_labels, user_annotations, Owned, ROLE_PGADMIN};
use crate::{reconcilers::Resolution, resources::PGAdmin, Result};

pub const SETTINGS_KEY: &str = "pgadmin-settings.json";
pub const SHARED_CLUSTERS_KEY: &str = "pgadmin-shared-clusters.json";

/// Name of the ConfigMap holding pgAdmin configuration.
pub fn configuration_name(pgadmin: &PGAdmin) -> String {
    pgadmin.prefixed_name("config")
}

/// The ConfigMap with pgAdmin settings and the servers of every resolved cluster.
pub fn configuration(pgadmin: &PGAdmin, resolution: &Resolution) -> Result<ConfigMap> {
    let Owned { namespace, owner } = Owned::of(pgadmin)?;

    Ok(ConfigMap {
        metadata: meta! {
            owners: vec![owner],
            name: Some(configuration_name(pgadmin)),
            namespace: Some(namespace),
            labels: Some(merged_labels(pgadmin, labels! {
                instance: pgadmin.name_any(),
                super::LABEL_ROLE => ROLE_PGADMIN
            })),
            annotations: user_annotations(pgadmin)
        },
        data: Some(BTreeMap::from([
            (SETTINGS_KEY.into(), settings(pgadmin)?),
            (SHARED_CLUSTERS_KEY.into(), shared_clusters(resolution)?),
        ])),

        binary_data: None,
        immutable: None,
    })
}

/// Operator defaults overlaid with `spec.config.settings`.
fn settings(pgadmin: &PGAdmin) -> Result<String> {
    let mut settings = Map::from_iter([
        ("SERVER_MODE".to_string(), Value::Bool(true)),
        ("UPGRADE_CHECK_ENABLED".to_string(), Value::Bool(false)),
        ("UPGRADE_CHECK_URL".to_string(), Value::String(String::new())),
        ("UPGRADE_CHECK_KEY".to_string(), Value::String(String::new())),
    ]);
    if let Some(user) = &pgadmin.spec.config.settings {
        settings.extend(user.clone());
    }

    Ok(serde_json::to_string_pretty(&settings)?)
}

/// The server definitions pgAdmin loads at startup, in server group order.
///
/// Keys are zero-padded to a common width so they sort in rendering order.
fn shared_clusters(resolution: &Resolution) -> Result<String> {
    let width = resolution.len().to_string().len();
    let servers: Map<String, Value> = resolution
        .clusters()
        .enumerate()
        .map(|(index, (group, cluster))| {
            let name = cluster.name_any();
            let namespace = cluster.namespace().unwrap_or_default();
            let server = json!({
                "Name": name,
                "Group": group,
                "Host": format!("{name}-primary.{namespace}.svc"),
                "Port": cluster.port(),
                "MaintenanceDB": "postgres",
                "Username": name,
                "Shared": true,
                "ConnectionParameters": { "sslmode": "prefer" },
            });
            (format!("{:0width$}", index + 1), server)
        })
        .collect();

    Ok(serde_json::to_string_pretty(&json!({ "Servers": servers }))?)
}
