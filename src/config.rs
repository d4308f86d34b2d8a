use std::{net::SocketAddr, time::Duration};

use clap::Parser;

use crate::resources::PGAdminSpec;

/// Command line and environment configuration of the operator
#[derive(Parser, Debug, Clone)]
#[command(name = "pgadmin-operator", version, about = "Reconciles standalone pgAdmin instances")]
pub struct OperatorConfig {
    /// Image used when a PGAdmin does not name one.
    #[arg(long, env = "RELATED_IMAGE_STANDALONE_PGADMIN")]
    pub pgadmin_image: Option<String>,

    /// Field manager for server-side apply and status patches.
    #[arg(long, env = "PGO_FIELD_OWNER", default_value = crate::FIELD_OWNER)]
    pub field_owner: String,

    /// Only watch objects in this namespace.
    #[arg(long, env = "PGO_TARGET_NAMESPACE")]
    pub namespace: Option<String>,

    /// Address of the metrics and diagnostics server.
    #[arg(long, env = "PGO_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Deadline for every request made to the API server.
    #[arg(long, env = "PGO_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Emit logs as JSON.
    #[arg(long, env = "PGO_LOG_JSON")]
    pub log_json: bool,
}

impl OperatorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn image_resolver(&self) -> ImageDefaults {
        ImageDefaults {
            standalone_pgadmin: self.pgadmin_image.clone(),
        }
    }
}

/// Picks the container image for a pgAdmin.
pub trait ImageResolver: Send + Sync {
    /// Returns `None` when no image can be determined.
    fn resolve_image(&self, spec: &PGAdminSpec) -> Option<String>;
}

/// Resolves images from the spec first, then from operator-wide defaults.
#[derive(Debug, Clone, Default)]
pub struct ImageDefaults {
    pub standalone_pgadmin: Option<String>,
}

impl ImageResolver for ImageDefaults {
    fn resolve_image(&self, spec: &PGAdminSpec) -> Option<String> {
        [spec.image.as_ref(), self.standalone_pgadmin.as_ref()]
            .into_iter()
            .flatten()
            .find(|image| !image.is_empty())
            .cloned()
    }
}
