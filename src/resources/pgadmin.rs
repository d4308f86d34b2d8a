use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::{
    api::core::v1::{
        Affinity, LocalObjectReference, PersistentVolumeClaimSpec, ResourceRequirements,
        Toleration,
    },
    apimachinery::pkg::apis::meta::v1::{Condition, LabelSelector},
};
use kube::{CustomResource, ResourceExt as _};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::PostgresCluster;
use crate::{selector, Error, Result};

/// Condition type maintained by the reconciler on every pass.
pub const CONDITION_RECONCILED: &str = "Reconciled";

/// Specification for a standalone pgAdmin instance
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    kind = "PGAdmin",
    group = "postgres-operator.crunchydata.com",
    version = "v1beta1",
    status = "PGAdminStatus",
    doc = "A standalone pgAdmin instance and the PostgresClusters it is connected to",
    namespaced,
    printcolumn = r#"{ "name": "observed", "type": "integer", "description": "last fully reconciled generation", "jsonPath": ".status.observedGeneration" }"#,
    printcolumn = r#"{ "name": "reconciled", "type": "string", "description": "outcome of the last reconciliation", "jsonPath": ".status.conditions[?(@.type==\"Reconciled\")].status" }"#
)]
#[serde(rename_all = "camelCase")]
pub struct PGAdminSpec {
    /// Labels and annotations added to every object created for this pgAdmin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Configuration for the pgAdmin process.
    #[serde(default)]
    pub config: StandaloneConfiguration,

    /// Defines a PersistentVolumeClaim for pgAdmin data.
    ///
    /// More info: https://kubernetes.io/docs/concepts/storage/persistent-volumes
    pub data_volume_claim_spec: PersistentVolumeClaimSpec,

    /// The image name to use for pgAdmin instance.
    ///
    /// When omitted, the operator falls back to its configured default
    /// (`RELATED_IMAGE_STANDALONE_PGADMIN`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Image pull policy for the pgAdmin container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// References to secrets used to pull the pgAdmin image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secrets: Option<Vec<LocalObjectReference>>,

    /// Compute resources of the pgAdmin container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Scheduling constraints of the pgAdmin pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Priority class name for the pgAdmin pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Tolerations of the pgAdmin pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    /// Groups of PostgresClusters shown in pgAdmin.
    ///
    /// Each group selects clusters in the namespace of this pgAdmin either by
    /// name or by label selector. An empty selector selects every cluster.
    #[serde(default)]
    pub server_groups: Vec<ServerGroup>,
}

/// Metadata propagated to dependent objects
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Configuration of the pgAdmin process
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StandaloneConfiguration {
    /// Settings for the pgAdmin server process. Keys are pgAdmin configuration
    /// parameters, merged over the operator defaults.
    ///
    /// More info: https://www.pgadmin.org/docs/pgadmin4/latest/config_py.html
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub settings: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A named group of PostgresClusters
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerGroup {
    /// The name for the ServerGroup in pgAdmin. Must be unique in the pgAdmin's ServerGroups.
    pub name: String,

    /// Name of a PostgresCluster in the same namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres_cluster_name: Option<String>,

    /// Label selector for PostgresClusters in the same namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres_cluster_selector: Option<LabelSelector>,
}

/// The status of the pgAdmin instance
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PGAdminStatus {
    /// Conditions describing the last reconciliation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// The generation most recently reconciled without error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

fn preserve_unknown_fields(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    let mut schema = schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".into(),
        serde_json::Value::Bool(true),
    );
    schema.into()
}

impl PGAdmin {
    /// Fill in unset optional fields.
    pub fn apply_defaults(&mut self) {
        let claim = &mut self.spec.data_volume_claim_spec;
        if claim.access_modes.as_ref().map_or(true, Vec::is_empty) {
            claim.access_modes = Some(vec!["ReadWriteOnce".into()]);
        }
    }

    /// Generate a name with the pgAdmin instance as a prefix
    pub fn prefixed_name(&self, rest: impl AsRef<str>) -> String {
        format!("{}-{}", self.name_any(), rest.as_ref())
    }

    /// Check the parts of the spec that the API server cannot.
    pub fn validate(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        for group in &self.spec.server_groups {
            if !names.insert(group.name.as_str()) {
                return Err(self.illegal(format!("duplicate server group {:?}", group.name)));
            }

            match (&group.postgres_cluster_name, &group.postgres_cluster_selector) {
                (Some(_), None) => {}
                (None, Some(selector)) => selector::validate(selector)?,
                _ => {
                    return Err(self.illegal(format!(
                        "server group {:?} must set exactly one of postgresClusterName or postgresClusterSelector",
                        group.name
                    )))
                }
            }
        }

        Ok(())
    }

    fn illegal(&self, reason: String) -> Error {
        Error::IllegalPGAdmin(self.name_any(), reason)
    }
}

impl ServerGroup {
    /// Whether this group selects `cluster`.
    ///
    /// Namespaces are not compared here; callers only offer clusters from the
    /// pgAdmin's own namespace.
    pub fn selects(&self, cluster: &PostgresCluster) -> Result<bool> {
        match (&self.postgres_cluster_name, &self.postgres_cluster_selector) {
            (Some(name), None) => Ok(cluster.name_any() == *name),
            (None, Some(selector)) => selector::matches(selector, cluster.labels()),
            _ => Ok(false),
        }
    }
}

impl PGAdminStatus {
    /// Add or replace the condition of the same type.
    ///
    /// The transition time is kept unless the condition status changed.
    pub fn set_condition(&mut self, condition: Condition) {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status != condition.status {
                    existing.last_transition_time = condition.last_transition_time;
                }
                existing.status = condition.status;
                existing.reason = condition.reason;
                existing.message = condition.message;
                existing.observed_generation = condition.observed_generation;
            }
            None => self.conditions.push(condition),
        }
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}
