use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Port PostgreSQL listens on when a cluster does not say otherwise.
pub const DEFAULT_POSTGRES_PORT: i32 = 5432;

/// The parts of a PostgresCluster that pgAdmin needs to connect to it.
///
/// PostgresClusters are owned by another controller; this operator only reads
/// them, so every other field of the resource is ignored.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    kind = "PostgresCluster",
    group = "postgres-operator.crunchydata.com",
    version = "v1beta1",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresClusterSpec {
    /// The port on which PostgreSQL should listen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

impl PostgresCluster {
    /// The port the primary accepts connections on.
    pub fn port(&self) -> i32 {
        self.spec.port.unwrap_or(DEFAULT_POSTGRES_PORT)
    }
}
