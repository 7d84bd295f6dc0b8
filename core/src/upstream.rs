//! Upstream declarations and the capability interface shared by all upstream kinds

use crate::condition::Condition;
use crate::context::ProbeContext;
use crate::directory::DirectoryConnector;
use crate::provider::ProviderConfig;
use crate::tls::TlsSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identity of a declared upstream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    /// Bumped by the owner whenever the spec changes
    #[serde(default)]
    pub generation: i64,
}

/// Reference to the basic-auth secret holding the bind account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindSpec {
    pub secret_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSearchAttributes {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub uid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSearchSpec {
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub attributes: UserSearchAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSearchAttributes {
    #[serde(default)]
    pub group_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSearchSpec {
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub attributes: GroupSearchAttributes,
    #[serde(default)]
    pub skip_group_refresh: bool,
}

/// Connection settings declared by an administrator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamSpec {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,
    pub bind: BindSpec,
    #[serde(default)]
    pub user_search: UserSearchSpec,
    #[serde(default)]
    pub group_search: GroupSearchSpec,
}

/// Result of search base detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchBaseResolution {
    pub condition: Condition,
    /// Base to use wherever the declaration left one empty
    pub default_search_base: Option<String>,
}

/// An upstream kind the validator can work with.
///
/// Kinds differ only in the defaults and function tables they put into the
/// initial [`ProviderConfig`] and in how they detect a missing search base.
#[async_trait]
pub trait GenericLdapUpstream: Send + Sync {
    /// Kind name used in log and status output
    fn kind(&self) -> &'static str;

    fn metadata(&self) -> &ObjectMeta;

    fn spec(&self) -> &UpstreamSpec;

    /// Conditions from the last persisted status
    fn conditions(&self) -> &[Condition];

    /// Initial configuration for one validation pass
    fn provider_config(&self) -> ProviderConfig;

    /// Fill unspecified search bases by asking the server.
    ///
    /// Returns `None` when this kind has nothing to detect.
    async fn detect_and_set_search_base(
        &self,
        ctx: &ProbeContext,
        connector: &dyn DirectoryConnector,
        config: &ProviderConfig,
    ) -> Option<SearchBaseResolution>;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn namespace(&self) -> &str {
        &self.metadata().namespace
    }

    fn generation(&self) -> i64 {
        self.metadata().generation
    }

    fn host(&self) -> &str {
        &self.spec().host
    }

    fn tls_spec(&self) -> Option<&TlsSpec> {
        self.spec().tls.as_ref()
    }

    fn bind_secret_name(&self) -> &str {
        &self.spec().bind.secret_name
    }

    fn user_search(&self) -> &UserSearchSpec {
        &self.spec().user_search
    }

    fn group_search(&self) -> &GroupSearchSpec {
        &self.spec().group_search
    }
}
