//! Bind secret lookup and validation

use crate::condition::{
    Condition, REASON_SECRET_MISSING_KEYS, REASON_SECRET_NOT_FOUND, REASON_SECRET_WRONG_TYPE,
    REASON_SUCCESS, TYPE_BIND_SECRET_VALID,
};
use crate::provider::BindCredentials;
use crate::{Error, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Type a bind secret must have
pub const SECRET_TYPE_BASIC_AUTH: &str = "kubernetes.io/basic-auth";
pub const BASIC_AUTH_USERNAME_KEY: &str = "username";
pub const BASIC_AUTH_PASSWORD_KEY: &str = "password";

/// A credential object as seen by the validator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub secret_type: String,
    pub resource_version: String,
    pub data: HashMap<String, Vec<u8>>,
}

impl Secret {
    /// Basic-auth secret with the given username and password
    pub fn basic_auth(
        namespace: &str,
        name: &str,
        resource_version: &str,
        username: &str,
        password: &str,
    ) -> Self {
        let mut data = HashMap::new();
        data.insert(BASIC_AUTH_USERNAME_KEY.to_string(), username.as_bytes().to_vec());
        data.insert(BASIC_AUTH_PASSWORD_KEY.to_string(), password.as_bytes().to_vec());
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            secret_type: SECRET_TYPE_BASIC_AUTH.to_string(),
            resource_version: resource_version.to_string(),
            data,
        }
    }

    fn string_value(&self, key: &str) -> String {
        self.data
            .get(key)
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_default()
    }
}

/// Looks up secrets by namespace and name.
///
/// Implementations return [`Error::SecretNotFound`] for a missing secret. Any other
/// error is treated as an infrastructure failure and propagated.
pub trait SecretLookup: Send + Sync {
    fn get(&self, namespace: &str, name: &str) -> Result<Secret>;
}

/// Concurrent in-memory secret store
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: DashMap<(String, String), Secret>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a secret
    pub fn insert(&self, secret: Secret) {
        self.secrets
            .insert((secret.namespace.clone(), secret.name.clone()), secret);
    }

    pub fn remove(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|(_, secret)| secret)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl SecretLookup for InMemorySecretStore {
    fn get(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.secrets
            .get(&(namespace.to_string(), name.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

/// Outcome of validating a bind secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretValidation {
    pub condition: Condition,
    /// Resource version of the secret, empty when it was not found
    pub resource_version: String,
    /// Credentials read from a secret of the right type, possibly incomplete
    pub credentials: Option<BindCredentials>,
}

/// Validate the bind secret referenced by an upstream
pub fn validate_secret(
    lookup: &dyn SecretLookup,
    secret_name: &str,
    namespace: &str,
) -> Result<SecretValidation> {
    let secret = match lookup.get(namespace, secret_name) {
        Ok(secret) => secret,
        Err(err @ Error::SecretNotFound { .. }) => {
            return Ok(SecretValidation {
                condition: Condition::failure(
                    TYPE_BIND_SECRET_VALID,
                    REASON_SECRET_NOT_FOUND,
                    err.to_string(),
                ),
                resource_version: String::new(),
                credentials: None,
            });
        }
        Err(err) => return Err(err),
    };

    if secret.secret_type != SECRET_TYPE_BASIC_AUTH {
        return Ok(SecretValidation {
            condition: Condition::failure(
                TYPE_BIND_SECRET_VALID,
                REASON_SECRET_WRONG_TYPE,
                format!(
                    "referenced Secret {:?} has wrong type {:?} (should be {:?})",
                    secret_name, secret.secret_type, SECRET_TYPE_BASIC_AUTH
                ),
            ),
            resource_version: secret.resource_version,
            credentials: None,
        });
    }

    let credentials = BindCredentials {
        username: secret.string_value(BASIC_AUTH_USERNAME_KEY),
        password: secret.string_value(BASIC_AUTH_PASSWORD_KEY),
    };

    let condition = if credentials.username.is_empty() || credentials.password.is_empty() {
        Condition::failure(
            TYPE_BIND_SECRET_VALID,
            REASON_SECRET_MISSING_KEYS,
            format!(
                "referenced Secret {:?} is missing required keys [{:?} {:?}]",
                secret_name, BASIC_AUTH_USERNAME_KEY, BASIC_AUTH_PASSWORD_KEY
            ),
        )
    } else {
        Condition::success(TYPE_BIND_SECRET_VALID, REASON_SUCCESS, "loaded bind secret")
    };

    Ok(SecretValidation {
        condition,
        resource_version: secret.resource_version,
        credentials: Some(credentials),
    })
}
