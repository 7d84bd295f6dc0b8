//! Connection configuration handed to directory clients
//!
//! A [`ProviderConfig`] is assembled during one validation pass: the upstream kind
//! supplies search settings and its function tables, the secret validator supplies
//! bind credentials, the TLS validator supplies the CA bundle and the prober
//! settles the connection protocol. The finished value is what gets published.

use crate::directory::Entry;
use crate::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Default port for implicit TLS (ldaps)
pub const DEFAULT_LDAPS_PORT: u16 = 636;
/// Default port for plain LDAP upgraded with StartTLS
pub const DEFAULT_LDAP_PORT: u16 = 389;

/// How the client secures its connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionProtocol {
    #[default]
    Tls,
    StartTls,
}

impl ConnectionProtocol {
    pub fn default_port(&self) -> u16 {
        match self {
            ConnectionProtocol::Tls => DEFAULT_LDAPS_PORT,
            ConnectionProtocol::StartTls => DEFAULT_LDAP_PORT,
        }
    }
}

impl fmt::Display for ConnectionProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionProtocol::Tls => write!(f, "TLS"),
            ConnectionProtocol::StartTls => write!(f, "StartTLS"),
        }
    }
}

/// Parses an attribute of a directory entry into the value used for identity
pub type AttributeParser = Arc<dyn Fn(&Entry) -> Result<String> + Send + Sync>;

/// Checks an entry fetched during refresh against what was recorded at login
pub type RefreshCheck = Arc<dyn Fn(&Entry, &RefreshAttributes) -> Result<()> + Send + Sync>;

/// Resolved user search settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSearchConfig {
    pub base: String,
    pub filter: String,
    pub username_attribute: String,
    pub uid_attribute: String,
}

/// Resolved group search settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSearchConfig {
    pub base: String,
    pub filter: String,
    pub group_name_attribute: String,
    pub skip_group_refresh: bool,
}

/// Bind account loaded from the referenced secret
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BindCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BindCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// User attributes recorded at login and carried through refreshes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshAttributes {
    pub username: String,
    pub subject: String,
    pub dn: String,
    pub groups: Vec<String>,
    pub additional_attributes: HashMap<String, String>,
    pub granted_scopes: Vec<String>,
}

/// Everything a directory client needs to talk to one upstream
#[derive(Clone, Default)]
pub struct ProviderConfig {
    pub name: String,
    pub resource_uid: String,
    /// Host as declared, with or without a port
    pub host: String,
    pub connection_protocol: ConnectionProtocol,
    /// PEM bundle of trusted CAs; `None` means system roots
    pub ca_bundle: Option<Vec<u8>>,
    pub bind_username: String,
    pub bind_password: String,
    pub user_search: UserSearchConfig,
    pub group_search: GroupSearchConfig,
    pub uid_attribute_parsing_overrides: HashMap<String, AttributeParser>,
    pub group_attribute_parsing_overrides: HashMap<String, AttributeParser>,
    pub refresh_attribute_checks: HashMap<String, RefreshCheck>,
}

impl ProviderConfig {
    pub fn new(name: &str, resource_uid: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            resource_uid: resource_uid.to_string(),
            host: host.to_string(),
            ..Default::default()
        }
    }

    /// `host:port` to dial for the current protocol
    pub fn address(&self) -> String {
        host_with_default_port(&self.host, self.connection_protocol.default_port())
    }

    pub fn apply_bind_credentials(&mut self, credentials: BindCredentials) {
        self.bind_username = credentials.username;
        self.bind_password = credentials.password;
    }

    /// Fill whichever search bases are still empty
    pub fn apply_default_search_base(&mut self, base: &str) {
        if self.user_search.base.is_empty() {
            self.user_search.base = base.to_string();
        }
        if self.group_search.base.is_empty() {
            self.group_search.base = base.to_string();
        }
    }

    /// Copy with a different protocol, used for each probe attempt
    pub fn with_protocol(&self, protocol: ConnectionProtocol) -> Self {
        let mut config = self.clone();
        config.connection_protocol = protocol;
        config
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn sorted<V>(map: &HashMap<String, V>) -> Vec<&String> {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys
        }
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("resource_uid", &self.resource_uid)
            .field("host", &self.host)
            .field("connection_protocol", &self.connection_protocol)
            .field("ca_bundle_len", &self.ca_bundle.as_ref().map(Vec::len))
            .field("bind_username", &self.bind_username)
            .field("bind_password", &"<redacted>")
            .field("user_search", &self.user_search)
            .field("group_search", &self.group_search)
            .field(
                "uid_attribute_parsing_overrides",
                &sorted(&self.uid_attribute_parsing_overrides),
            )
            .field(
                "group_attribute_parsing_overrides",
                &sorted(&self.group_attribute_parsing_overrides),
            )
            .field(
                "refresh_attribute_checks",
                &sorted(&self.refresh_attribute_checks),
            )
            .finish()
    }
}

/// Append `default_port` to `host` unless it already names a port.
///
/// Handles `name`, `name:port`, `[v6]`, `[v6]:port` and bare IPv6 literals.
pub fn host_with_default_port(host: &str, default_port: u16) -> String {
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((_, after)) if after.starts_with(':') => host.to_string(),
            _ => format!("{}:{}", host, default_port),
        };
    }

    match host.matches(':').count() {
        0 => format!("{}:{}", host, default_port),
        1 => host.to_string(),
        _ => format!("[{}]:{}", host, default_port),
    }
}

/// Refresh check that fails when a single-valued attribute changed since login.
///
/// The login flow records the raw value base64url encoded (no padding) under the
/// attribute's name in [`RefreshAttributes::additional_attributes`].
pub fn attribute_unchanged_since_login(attribute: &str) -> RefreshCheck {
    let attribute = attribute.to_string();
    Arc::new(move |entry: &Entry, stored: &RefreshAttributes| {
        let values = entry.raw_values(&attribute);
        if values.len() != 1 {
            return Err(Error::InvalidAttribute(format!(
                "expected to find 1 value for {:?} attribute, but found {}",
                attribute,
                values.len()
            )));
        }
        let previous = stored
            .additional_attributes
            .get(&attribute)
            .map(String::as_str)
            .unwrap_or_default();
        if previous != URL_SAFE_NO_PAD.encode(&values[0]) {
            return Err(Error::InvalidAttribute(format!(
                "value for attribute {:?} has changed since initial value at login",
                attribute
            )));
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_with_default_port() {
        assert_eq!(host_with_default_port("ldap.example.com", 636), "ldap.example.com:636");
        assert_eq!(host_with_default_port("ldap.example.com:5678", 636), "ldap.example.com:5678");
        assert_eq!(host_with_default_port("[::1]", 389), "[::1]:389");
        assert_eq!(host_with_default_port("[::1]:1234", 389), "[::1]:1234");
        assert_eq!(host_with_default_port("fe80::1", 636), "[fe80::1]:636");
    }

    #[test]
    fn test_address_switches_port_with_protocol() {
        let mut config = ProviderConfig::new("idp", "uid", "ldap.example.com");
        assert_eq!(config.address(), "ldap.example.com:636");
        config.connection_protocol = ConnectionProtocol::StartTls;
        assert_eq!(config.address(), "ldap.example.com:389");

        config.host = "ldap.example.com:123".to_string();
        assert_eq!(config.address(), "ldap.example.com:123");
    }

    #[test]
    fn test_apply_default_search_base_only_fills_empty() {
        let mut config = ProviderConfig::new("idp", "uid", "host");
        config.user_search.base = "ou=users,dc=example,dc=com".to_string();
        config.apply_default_search_base("dc=example,dc=com");
        assert_eq!(config.user_search.base, "ou=users,dc=example,dc=com");
        assert_eq!(config.group_search.base, "dc=example,dc=com");
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut config = ProviderConfig::new("idp", "uid", "host");
        config.bind_password = "hunter2".to_string();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_attribute_unchanged_since_login() {
        let check = attribute_unchanged_since_login("pwdLastSet");
        let entry = Entry::new("cn=pinny").with_attribute("pwdLastSet", vec!["132801740800000000"]);

        let mut stored = RefreshAttributes::default();
        stored.additional_attributes.insert(
            "pwdLastSet".to_string(),
            URL_SAFE_NO_PAD.encode("132801740800000000"),
        );
        assert!(check(&entry, &stored).is_ok());

        stored
            .additional_attributes
            .insert("pwdLastSet".to_string(), URL_SAFE_NO_PAD.encode("0"));
        let err = check(&entry, &stored).unwrap_err();
        assert_eq!(
            err.to_string(),
            "value for attribute \"pwdLastSet\" has changed since initial value at login"
        );

        let missing = Entry::new("cn=pinny");
        let err = check(&missing, &stored).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected to find 1 value for \"pwdLastSet\" attribute, but found 0"
        );
    }
}
