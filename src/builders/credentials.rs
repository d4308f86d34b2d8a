use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::Secret, ByteString};
use kube::ResourceExt as _;
use uuid::Uuid;

use super::{merged_labels, user_annotations, Owned, ROLE_PGADMIN};
use crate::{resources::PGAdmin, Result};

pub const SECRET_USERNAME_KEY: &str = "username";
pub const SECRET_PASSWORD_KEY: &str = "password";

/// Name of the Secret holding the pgAdmin login.
pub fn credentials_name(pgadmin: &PGAdmin) -> String {
    pgadmin.prefixed_name("secret")
}

/// The password stored in `existing`, if there is a usable one.
pub fn existing_password(existing: Option<&Secret>) -> Option<ByteString> {
    existing
        .and_then(|secret| secret.data.as_ref())
        .and_then(|data| data.get(SECRET_PASSWORD_KEY))
        .filter(|password| !password.0.is_empty())
        .cloned()
}

/// Fresh random password material.
pub fn generate_password() -> ByteString {
    ByteString(format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()).into_bytes())
}

/// The Secret holding the initial pgAdmin login.
pub fn credentials(pgadmin: &PGAdmin, password: ByteString) -> Result<Secret> {
    let Owned { namespace, owner } = Owned::of(pgadmin)?;
    let username = format!("admin@{}.{namespace}.svc", pgadmin.name_any());

    Ok(Secret {
        metadata: meta! {
            owners: vec![owner],
            name: Some(credentials_name(pgadmin)),
            namespace: Some(namespace),
            labels: Some(merged_labels(pgadmin, labels! {
                instance: pgadmin.name_any(),
                super::LABEL_ROLE => ROLE_PGADMIN
            })),
            annotations: user_annotations(pgadmin)
        },
        data: Some(BTreeMap::from([
            (SECRET_USERNAME_KEY.into(), ByteString(username.into_bytes())),
            (SECRET_PASSWORD_KEY.into(), password),
        ])),
        type_: Some("Opaque".into()),

        ..Default::default()
    })
}
