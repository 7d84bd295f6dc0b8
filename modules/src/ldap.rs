//! Plain LDAP upstream kind
//!
//! Settings are taken from the declaration as written. There are no attribute
//! overrides and no search base detection.

use upstream_core::condition::Condition;
use upstream_core::provider::{GroupSearchConfig, ProviderConfig, UserSearchConfig};
use upstream_core::upstream::{ObjectMeta, SearchBaseResolution, UpstreamSpec};
use upstream_core::{async_trait, DirectoryConnector, GenericLdapUpstream, ProbeContext};

pub const KIND: &str = "LDAPIdentityProvider";

/// A plain LDAP upstream declaration
#[derive(Debug, Clone, Default)]
pub struct LdapIdentityProvider {
    pub metadata: ObjectMeta,
    pub spec: UpstreamSpec,
    pub conditions: Vec<Condition>,
}

impl LdapIdentityProvider {
    pub fn new(metadata: ObjectMeta, spec: UpstreamSpec) -> Self {
        Self {
            metadata,
            spec,
            conditions: Vec::new(),
        }
    }
}

#[async_trait]
impl GenericLdapUpstream for LdapIdentityProvider {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn spec(&self) -> &UpstreamSpec {
        &self.spec
    }

    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn provider_config(&self) -> ProviderConfig {
        let user_search = &self.spec.user_search;
        let group_search = &self.spec.group_search;

        let mut config =
            ProviderConfig::new(&self.metadata.name, &self.metadata.uid, &self.spec.host);
        config.user_search = UserSearchConfig {
            base: user_search.base.clone(),
            filter: user_search.filter.clone(),
            username_attribute: user_search.attributes.username.clone(),
            uid_attribute: user_search.attributes.uid.clone(),
        };
        config.group_search = GroupSearchConfig {
            base: group_search.base.clone(),
            filter: group_search.filter.clone(),
            group_name_attribute: group_search.attributes.group_name.clone(),
            skip_group_refresh: group_search.skip_group_refresh,
        };
        config
    }

    async fn detect_and_set_search_base(
        &self,
        _ctx: &ProbeContext,
        _connector: &dyn DirectoryConnector,
        _config: &ProviderConfig,
    ) -> Option<SearchBaseResolution> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upstream_core::testing::FakeConnector;
    use upstream_core::upstream::{
        BindSpec, GroupSearchAttributes, GroupSearchSpec, UserSearchAttributes, UserSearchSpec,
    };
    use upstream_core::{CancellationToken, PROBE_LDAP_TIMEOUT};

    fn upstream() -> LdapIdentityProvider {
        LdapIdentityProvider::new(
            ObjectMeta {
                name: "corp-ldap".to_string(),
                namespace: "default".to_string(),
                uid: "uid-1".to_string(),
                generation: 3,
            },
            UpstreamSpec {
                host: "ldap.example.com".to_string(),
                tls: None,
                bind: BindSpec {
                    secret_name: "bind".to_string(),
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
                    skip_group_refresh: true,
                },
            },
        )
    }

    #[test]
    fn test_provider_config_copies_spec() {
        let config = upstream().provider_config();
        assert_eq!(config.name, "corp-ldap");
        assert_eq!(config.resource_uid, "uid-1");
        assert_eq!(config.host, "ldap.example.com");
        assert_eq!(config.user_search.filter, "(uid={})");
        assert_eq!(config.user_search.uid_attribute, "uidNumber");
        assert_eq!(config.group_search.group_name_attribute, "cn");
        assert!(config.group_search.skip_group_refresh);
        assert!(config.uid_attribute_parsing_overrides.is_empty());
        assert!(config.group_attribute_parsing_overrides.is_empty());
        assert!(config.refresh_attribute_checks.is_empty());
    }

    #[tokio::test]
    async fn test_search_base_detection_is_a_no_op() {
        let connector = FakeConnector::new();
        let ldap = upstream();
        let parent = CancellationToken::new();
        let ctx = ProbeContext::with_timeout(&parent, PROBE_LDAP_TIMEOUT);
        let config = ldap.provider_config();

        let resolution = ldap.detect_and_set_search_base(&ctx, &connector, &config).await;
        assert!(resolution.is_none());
        assert_eq!(connector.dial_count(), 0);
    }
}
