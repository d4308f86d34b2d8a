use k8s_openapi::{
    api::{
        apps::v1::{StatefulSet, StatefulSetSpec},
        core::v1::{
            ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource,
            PersistentVolumeClaim, PersistentVolumeClaimVolumeSource, PodSecurityContext,
            PodSpec, PodTemplateSpec, SecretKeySelector, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};
use kube::{core::ObjectMeta, ResourceExt as _};

use super::{
    credentials_name, merged_labels, user_annotations, Owned, LABEL_ROLE, ROLE_PGADMIN,
    SECRET_PASSWORD_KEY, SECRET_USERNAME_KEY,
};
use crate::{resources::PGAdmin, Error, Result};

pub const PGADMIN_PORT: i32 = 5050;
pub const CONFIG_MOUNT_PATH: &str = "/etc/pgadmin/conf.d";
pub const DATA_MOUNT_PATH: &str = "/var/lib/pgadmin";

/// The StatefulSet running pgAdmin with its configuration and data volume mounted.
pub fn workload(
    pgadmin: &PGAdmin,
    image: &str,
    configmap: &ConfigMap,
    data_volume: &PersistentVolumeClaim,
) -> Result<StatefulSet> {
    let Owned { namespace, owner } = Owned::of(pgadmin)?;
    let name = pgadmin.name_any();
    let spec = &pgadmin.spec;

    let selector = labels! { instance: name.clone(), LABEL_ROLE => ROLE_PGADMIN };
    let labels = merged_labels(pgadmin, selector.clone());
    let named = |meta: &ObjectMeta, what: &str| {
        meta.name
            .clone()
            .ok_or_else(|| Error::IllegalPGAdmin(name.clone(), format!("unnamed {what}")))
    };

    let from_secret = |env: &str, key: &str| EnvVar {
        name: env.into(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(credentials_name(pgadmin)),
                key: key.into(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(StatefulSet {
        metadata: meta! {
            owners: vec![owner],
            name: Some(name.clone()),
            namespace: Some(namespace),
            labels: Some(labels.clone()),
            annotations: user_annotations(pgadmin)
        },

        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            service_name: name.clone(),
            selector: LabelSelector {
                match_labels: Some(selector),
                match_expressions: None,
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: user_annotations(pgadmin),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "pgadmin".into(),
                        image: Some(image.into()),
                        image_pull_policy: spec.image_pull_policy.clone(),
                        ports: Some(vec![ContainerPort {
                            name: Some("pgadmin".into()),
                            container_port: PGADMIN_PORT,
                            protocol: Some("TCP".into()),
                            ..Default::default()
                        }]),
                        env: Some(vec![
                            from_secret("PGADMIN_SETUP_EMAIL", SECRET_USERNAME_KEY),
                            from_secret("PGADMIN_SETUP_PASSWORD", SECRET_PASSWORD_KEY),
                        ]),
                        resources: spec.resources.clone(),
                        volume_mounts: Some(vec![
                            VolumeMount {
                                name: "pgadmin-config".into(),
                                mount_path: CONFIG_MOUNT_PATH.into(),
                                read_only: Some(true),
                                ..Default::default()
                            },
                            VolumeMount {
                                name: "pgadmin-data".into(),
                                mount_path: DATA_MOUNT_PATH.into(),
                                ..Default::default()
                            },
                        ]),

                        ..Default::default()
                    }],
                    volumes: Some(vec![
                        Volume {
                            name: "pgadmin-config".into(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: Some(named(&configmap.metadata, "configmap")?),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        Volume {
                            name: "pgadmin-data".into(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: named(&data_volume.metadata, "data volume")?,
                                read_only: None,
                            }),
                            ..Default::default()
                        },
                    ]),
                    security_context: Some(PodSecurityContext {
                        fs_group: Some(2),
                        run_as_non_root: Some(true),
                        ..Default::default()
                    }),
                    affinity: spec.affinity.clone(),
                    tolerations: spec.tolerations.clone(),
                    priority_class_name: spec.priority_class_name.clone(),
                    image_pull_secrets: spec.image_pull_secrets.clone(),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}
