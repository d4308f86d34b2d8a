use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt as _;

use super::{merged_labels, user_annotations, Owned, LABEL_DATA, ROLE_PGADMIN};
use crate::{resources::PGAdmin, Result};

/// Name of the claim holding pgAdmin's data directory.
pub fn data_volume_name(pgadmin: &PGAdmin) -> String {
    pgadmin.prefixed_name("data")
}

/// The claim described by `spec.dataVolumeClaimSpec`.
pub fn data_volume(pgadmin: &PGAdmin) -> Result<PersistentVolumeClaim> {
    let Owned { namespace, owner } = Owned::of(pgadmin)?;

    Ok(PersistentVolumeClaim {
        metadata: meta! {
            owners: vec![owner],
            name: Some(data_volume_name(pgadmin)),
            namespace: Some(namespace),
            labels: Some(merged_labels(pgadmin, labels! {
                instance: pgadmin.name_any(),
                LABEL_DATA => ROLE_PGADMIN
            })),
            annotations: user_annotations(pgadmin)
        },
        spec: Some(pgadmin.spec.data_volume_claim_spec.clone()),
        status: None,
    })
}
