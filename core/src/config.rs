//! Configuration management

use crate::secret::{InMemorySecretStore, Secret, SECRET_TYPE_BASIC_AUTH};
use crate::tls::TlsSpec;
use crate::upstream::{
    BindSpec, GroupSearchAttributes, GroupSearchSpec, ObjectMeta, UpstreamSpec,
    UserSearchAttributes, UserSearchSpec,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Watcher configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub settings: Settings,
    /// Bind secrets
    #[serde(default)]
    pub secrets: Vec<SecretConfig>,
    /// Plain LDAP upstreams
    #[serde(default)]
    pub ldap: Vec<UpstreamConfig>,
    /// Active Directory upstreams
    #[serde(default)]
    pub active_directory: Vec<UpstreamConfig>,
}

/// Global settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Budget for each connection probe and each search base query
    #[serde(default = "default_probe_timeout_seconds")]
    pub probe_timeout_seconds: u64,
    /// Delay between sync passes in watch mode
    #[serde(default = "default_resync_interval_seconds")]
    pub resync_interval_seconds: u64,
    /// Namespace used for entries that do not name one
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            probe_timeout_seconds: default_probe_timeout_seconds(),
            resync_interval_seconds: default_resync_interval_seconds(),
            namespace: default_namespace(),
        }
    }
}

fn default_probe_timeout_seconds() -> u64 {
    90
}

fn default_resync_interval_seconds() -> u64 {
    60
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_secret_type() -> String {
    SECRET_TYPE_BASIC_AUTH.to_string()
}

fn default_resource_version() -> String {
    "1".to_string()
}

fn default_generation() -> i64 {
    1
}

/// A secret declared in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(rename = "type", default = "default_secret_type")]
    pub secret_type: String,
    #[serde(default = "default_resource_version")]
    pub resource_version: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl SecretConfig {
    /// Convert into a secret, using `default_namespace` when none is set
    pub fn to_secret(&self, default_namespace: &str) -> Secret {
        Secret {
            name: self.name.clone(),
            namespace: namespace_or(&self.namespace, default_namespace),
            secret_type: self.secret_type.clone(),
            resource_version: self.resource_version.clone(),
            data: self
                .data
                .iter()
                .map(|(k, v)| (k.clone(), v.as_bytes().to_vec()))
                .collect(),
        }
    }
}

/// An upstream declared in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default = "default_generation")]
    pub generation: i64,
    #[serde(flatten)]
    pub spec: UpstreamSpec,
}

impl UpstreamConfig {
    /// Identity of this upstream, using `default_namespace` when none is set
    pub fn metadata(&self, default_namespace: &str) -> ObjectMeta {
        let namespace = namespace_or(&self.namespace, default_namespace);
        let uid = if self.uid.is_empty() {
            format!("{}/{}", namespace, self.name)
        } else {
            self.uid.clone()
        };
        ObjectMeta {
            name: self.name.clone(),
            namespace,
            uid,
            generation: self.generation,
        }
    }
}

fn namespace_or(namespace: &str, default_namespace: &str) -> String {
    if namespace.is_empty() {
        default_namespace.to_string()
    } else {
        namespace.to_string()
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        tracing::info!(
            "Loaded {} LDAP and {} Active Directory upstreams from {:?}",
            config.ldap.len(),
            config.active_directory.len(),
            path.as_ref()
        );
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.settings.probe_timeout_seconds == 0 {
            return Err(Error::Config("Probe timeout must be greater than 0".to_string()));
        }
        if self.settings.resync_interval_seconds == 0 {
            return Err(Error::Config("Resync interval must be greater than 0".to_string()));
        }

        let mut seen_secrets = HashSet::new();
        for secret in &self.secrets {
            if secret.name.is_empty() {
                return Err(Error::Config("Secret name cannot be empty".to_string()));
            }
            let namespace = namespace_or(&secret.namespace, &self.settings.namespace);
            if !seen_secrets.insert((namespace.clone(), secret.name.clone())) {
                return Err(Error::Config(format!(
                    "Duplicate secret {}/{} in configuration",
                    namespace, secret.name
                )));
            }
        }

        let mut seen_upstreams = HashSet::new();
        for upstream in self.ldap.iter().chain(self.active_directory.iter()) {
            if upstream.name.is_empty() {
                return Err(Error::Config("Upstream name cannot be empty".to_string()));
            }
            if upstream.spec.host.is_empty() {
                return Err(Error::Config(format!(
                    "Upstream {} must specify a host",
                    upstream.name
                )));
            }
            if upstream.spec.bind.secret_name.is_empty() {
                return Err(Error::Config(format!(
                    "Upstream {} must reference a bind secret",
                    upstream.name
                )));
            }
            if !seen_upstreams.insert(upstream.name.clone()) {
                return Err(Error::Config(format!(
                    "Duplicate upstream {} in configuration",
                    upstream.name
                )));
            }
        }

        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.probe_timeout_seconds)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.settings.resync_interval_seconds)
    }

    /// Secret store holding every configured secret
    pub fn secret_store(&self) -> InMemorySecretStore {
        let store = InMemorySecretStore::new();
        for secret in &self.secrets {
            store.insert(secret.to_secret(&self.settings.namespace));
        }
        store
    }

    /// Example configuration with one upstream of each kind
    pub fn sample() -> Self {
        let mut data = HashMap::new();
        data.insert("username".to_string(), "cn=admin,dc=example,dc=com".to_string());
        data.insert("password".to_string(), "changeme".to_string());

        Self {
            settings: Settings::default(),
            secrets: vec![SecretConfig {
                name: "ldap-bind-account".to_string(),
                namespace: String::new(),
                secret_type: default_secret_type(),
                resource_version: default_resource_version(),
                data,
            }],
            ldap: vec![UpstreamConfig {
                name: "corp-ldap".to_string(),
                namespace: String::new(),
                uid: String::new(),
                generation: default_generation(),
                spec: UpstreamSpec {
                    host: "ldap.example.com".to_string(),
                    tls: Some(TlsSpec::default()),
                    bind: BindSpec {
                        secret_name: "ldap-bind-account".to_string(),
                    },
                    user_search: UserSearchSpec {
                        base: "ou=users,dc=example,dc=com".to_string(),
                        filter: "(uid={})".to_string(),
                        attributes: UserSearchAttributes {
                            username: "uid".to_string(),
                            uid: "uidNumber".to_string(),
                        },
                    },
                    group_search: GroupSearchSpec {
                        base: "ou=groups,dc=example,dc=com".to_string(),
                        filter: "(member={})".to_string(),
                        attributes: GroupSearchAttributes {
                            group_name: "cn".to_string(),
                        },
                        skip_group_refresh: false,
                    },
                },
            }],
            active_directory: vec![UpstreamConfig {
                name: "corp-ad".to_string(),
                namespace: String::new(),
                uid: String::new(),
                generation: default_generation(),
                spec: UpstreamSpec {
                    host: "dc01.corp.example.com".to_string(),
                    tls: None,
                    bind: BindSpec {
                        secret_name: "ldap-bind-account".to_string(),
                    },
                    user_search: UserSearchSpec::default(),
                    group_search: GroupSearchSpec::default(),
                },
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::SecretLookup;

    #[test]
    fn test_sample_is_valid() {
        let config = Config::sample();
        assert!(config.validate().is_ok());
        assert_eq!(config.probe_timeout(), Duration::from_secs(90));
        assert_eq!(config.resync_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_minimal() {
        let config: Config = toml::from_str(
            r#"
            [[secrets]]
            name = "bind"
            data = { username = "admin", password = "secret" }

            [[active_directory]]
            name = "ad"
            host = "dc01.example.com"
            bind = { secret_name = "bind" }
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.settings.namespace, "default");
        assert_eq!(config.secrets[0].secret_type, SECRET_TYPE_BASIC_AUTH);
        assert_eq!(config.secrets[0].resource_version, "1");

        let upstream = &config.active_directory[0];
        let meta = upstream.metadata(&config.settings.namespace);
        assert_eq!(meta.namespace, "default");
        assert_eq!(meta.uid, "default/ad");
        assert_eq!(meta.generation, 1);
        assert!(upstream.spec.user_search.base.is_empty());

        let store = config.secret_store();
        let secret = store.get("default", "bind").unwrap();
        assert_eq!(secret.data.get("username").map(Vec::as_slice), Some(&b"admin"[..]));
    }

    #[test]
    fn test_rejects_duplicate_upstreams_across_kinds() {
        let mut config = Config::sample();
        let mut duplicate = config.ldap[0].clone();
        duplicate.spec.host = "other.example.com".to_string();
        config.active_directory.push(duplicate);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate upstream corp-ldap"));
    }

    #[test]
    fn test_rejects_empty_host() {
        let mut config = Config::sample();
        config.ldap[0].spec.host.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = Config::sample();
        config.settings.probe_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }
}
