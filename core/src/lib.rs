//! LDAP Upstream Validation Core
//!
//! This crate decides whether declared LDAP and Active Directory upstreams are
//! usable: it checks bind secrets and TLS trust material, probes the directory
//! with a TLS to StartTLS fallback, caches what a successful probe learned, and
//! classifies the outcome into conditions and a publication decision.

pub mod cache;
pub mod condition;
pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod provider;
pub mod registry;
pub mod secret;
pub mod status;
pub mod testing;
pub mod tls;
pub mod upstream;
pub mod validator;

pub use cache::{CacheStats, SettingsCache, ValidatedSettings, ValidatedSettingsCache};
pub use condition::{Condition, ConditionStatus, GradatedCondition, GradatedConditions};
pub use config::{Config, SecretConfig, Settings, UpstreamConfig};
pub use context::{ProbeContext, PROBE_LDAP_TIMEOUT};
pub use directory::{DirectoryClient, DirectoryConnector, Entry, SearchRequest, SearchScope};
pub use error::{Error, Result};
pub use provider::{
    AttributeParser, BindCredentials, ConnectionProtocol, GroupSearchConfig, ProviderConfig,
    RefreshAttributes, RefreshCheck, UserSearchConfig,
};
pub use registry::ProviderRegistry;
pub use secret::{InMemorySecretStore, Secret, SecretLookup, SecretValidation};
pub use status::{Phase, UpstreamStatus};
pub use tls::{TlsSpec, TlsValidation};
pub use upstream::{GenericLdapUpstream, ObjectMeta, SearchBaseResolution, UpstreamSpec};
pub use validator::{evaluate_conditions, ConnectionProbe, GenericLdapValidator, ValidationOutcome};

/// Re-exports for convenience
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
pub use tracing::{debug, error, info, warn};
