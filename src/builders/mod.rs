//! Pure templating of the objects a pgAdmin depends on.
//!
//! Every builder is a function of the PGAdmin (after defaulting) and the
//! inputs passed to it. Building twice from the same inputs yields equal
//! objects, so re-applying them is a no-op against a converged cluster.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource as _, ResourceExt as _};

use crate::{resources::PGAdmin, Error, Result};

macro_rules! meta {
    (owners: $owners:expr, $($lhs:ident : $rhs:expr),*) => {{
        ::kube::core::ObjectMeta {
            owner_references: Some($owners),
            $($lhs : $rhs),*,

            ..Default::default()
        }
    }};
}

macro_rules! labels {
    (instance: $name:expr) => {{
        ::std::collections::BTreeMap::from_iter([
            (crate::builders::LABEL_PGADMIN.to_string(), $name),
            (crate::builders::LABEL_MANAGED_BY.to_string(), crate::FIELD_OWNER.to_string()),
        ])
    }};

    (instance: $name:expr, $($lhs:expr => $rhs:expr),*) => {{
        ::std::collections::BTreeMap::from_iter([
            (crate::builders::LABEL_PGADMIN.to_string(), $name),
            (crate::builders::LABEL_MANAGED_BY.to_string(), crate::FIELD_OWNER.to_string()),
            $(($lhs.to_string(), $rhs.to_string())),*
        ])
    }};
}

mod configuration;
mod credentials;
mod data_volume;
mod workload;

pub use configuration::*;
pub use credentials::*;
pub use data_volume::*;
pub use workload::*;

pub const LABEL_PGADMIN: &str = "postgres-operator.crunchydata.com/pgadmin";
pub const LABEL_ROLE: &str = "postgres-operator.crunchydata.com/role";
pub const LABEL_DATA: &str = "postgres-operator.crunchydata.com/data";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

pub const ROLE_PGADMIN: &str = "pgadmin";

/// Identity shared by every object built for one pgAdmin
struct Owned {
    namespace: String,
    owner: OwnerReference,
}

impl Owned {
    fn of(pgadmin: &PGAdmin) -> Result<Self> {
        let illegal = |reason: &str| Error::IllegalPGAdmin(pgadmin.name_any(), reason.into());

        Ok(Self {
            namespace: pgadmin.namespace().ok_or_else(|| illegal("missing namespace"))?,
            owner: pgadmin
                .controller_owner_ref(&())
                .ok_or_else(|| illegal("missing uid"))?,
        })
    }
}

/// User labels from `spec.metadata` overlaid with the operator's own labels.
fn merged_labels(pgadmin: &PGAdmin, ours: BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = pgadmin
        .spec
        .metadata
        .as_ref()
        .and_then(|m| m.labels.clone())
        .unwrap_or_default();
    labels.extend(ours);
    labels
}

fn user_annotations(pgadmin: &PGAdmin) -> Option<BTreeMap<String, String>> {
    pgadmin
        .spec
        .metadata
        .as_ref()
        .and_then(|m| m.annotations.clone())
        .filter(|a| !a.is_empty())
}
