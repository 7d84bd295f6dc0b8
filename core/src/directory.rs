//! Directory client capability consumed by the validation engine
//!
//! The engine never speaks LDAP itself. It asks a [`DirectoryConnector`] for a
//! client built from a [`ProviderConfig`] and drives it through the two operations
//! it needs: a dial-and-bind test and a search.

use crate::context::ProbeContext;
use crate::provider::ProviderConfig;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Search scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

/// Search request passed to a directory client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: SearchScope,
    pub filter: String,
    pub attributes: Vec<String>,
    /// Maximum number of entries the server should return (0 = no limit)
    pub size_limit: i32,
    /// Server-side time limit in seconds (0 = no limit)
    pub time_limit: i32,
}

/// A directory entry with raw attribute values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub dn: String,
    pub attributes: HashMap<String, Vec<Vec<u8>>>,
}

impl Entry {
    pub fn new(dn: &str) -> Self {
        Self {
            dn: dn.to_string(),
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute insertion
    pub fn with_attribute<V: AsRef<[u8]>>(mut self, name: &str, values: Vec<V>) -> Self {
        self.attributes.insert(
            name.to_string(),
            values.iter().map(|v| v.as_ref().to_vec()).collect(),
        );
        self
    }

    /// Raw values of an attribute; empty when absent
    pub fn raw_values(&self, name: &str) -> &[Vec<u8>] {
        self.attributes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Values of an attribute decoded as UTF-8 (lossy)
    pub fn values(&self, name: &str) -> Vec<String> {
        self.raw_values(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect()
    }

    /// First value of an attribute, or an empty string
    pub fn first_value(&self, name: &str) -> String {
        self.values(name).into_iter().next().unwrap_or_default()
    }
}

/// A client for one upstream directory
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Configuration the client was built from
    fn config(&self) -> &ProviderConfig;

    /// Upstream name this client serves
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Dial the server and bind with the service account
    async fn test_connection(&self, ctx: &ProbeContext) -> Result<()>;

    /// Dial, bind and run a search
    async fn search(&self, ctx: &ProbeContext, request: &SearchRequest) -> Result<Vec<Entry>>;
}

/// Builds directory clients from configuration
pub trait DirectoryConnector: Send + Sync {
    fn new_client(&self, config: ProviderConfig) -> Arc<dyn DirectoryClient>;
}
