//! Active Directory upstream kind
//!
//! Fills Active Directory defaults into the provider configuration, installs the
//! GUID and group-name parsers and the account refresh checks, and detects a
//! missing search base from the server's defaultNamingContext.

pub mod attributes;

use attributes::{
    computed_user_account_control_check, group_sam_account_name_parser,
    microsoft_uuid_from_binary_attr, user_account_control_check, PWD_LAST_SET_ATTRIBUTE,
    SAM_ACCOUNT_NAME_ATTRIBUTE, USER_ACCOUNT_CONTROL_ATTRIBUTE,
    USER_ACCOUNT_CONTROL_COMPUTED_ATTRIBUTE,
};
use std::collections::HashMap;
use tracing::{debug, info};
use upstream_core::condition::{
    Condition, REASON_ERROR_FETCHING_SEARCH_BASE, REASON_SUCCESS,
    REASON_USING_CONFIGURATION_FROM_SPEC, TYPE_SEARCH_BASE_FOUND,
};
use upstream_core::directory::{DirectoryClient, SearchRequest, SearchScope};
use upstream_core::provider::{
    attribute_unchanged_since_login, GroupSearchConfig, ProviderConfig, UserSearchConfig,
};
use upstream_core::upstream::{ObjectMeta, SearchBaseResolution, UpstreamSpec};
use upstream_core::{
    async_trait, DirectoryConnector, Error, GenericLdapUpstream, ProbeContext, Result,
};

pub const KIND: &str = "ActiveDirectoryIdentityProvider";

pub const DEFAULT_USERNAME_ATTRIBUTE: &str = "userPrincipalName";
pub const DEFAULT_UID_ATTRIBUTE: &str = "objectGUID";
pub const DEFAULT_GROUP_NAME_ATTRIBUTE: &str = SAM_ACCOUNT_NAME_ATTRIBUTE;
pub const DEFAULT_USER_SEARCH_FILTER: &str = "(&(objectClass=person)(!(objectClass=computer))(!(showInAdvancedViewOnly=TRUE))(|(sAMAccountName={})(mail={})(userPrincipalName={}))(sAMAccountType=805306368))";
pub const DEFAULT_GROUP_SEARCH_FILTER: &str =
    "(&(objectClass=group)(member:1.2.840.113556.1.4.1941:={}))";

const DEFAULT_NAMING_CONTEXT_ATTRIBUTE: &str = "defaultNamingContext";

/// An Active Directory upstream declaration
#[derive(Debug, Clone, Default)]
pub struct ActiveDirectoryIdentityProvider {
    pub metadata: ObjectMeta,
    pub spec: UpstreamSpec,
    pub conditions: Vec<Condition>,
}

impl ActiveDirectoryIdentityProvider {
    pub fn new(metadata: ObjectMeta, spec: UpstreamSpec) -> Self {
        Self {
            metadata,
            spec,
            conditions: Vec::new(),
        }
    }
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// Root DSE query for the default naming context
pub fn default_naming_context_request() -> SearchRequest {
    SearchRequest {
        base_dn: String::new(),
        scope: SearchScope::Base,
        filter: "(objectClass=*)".to_string(),
        attributes: vec![DEFAULT_NAMING_CONTEXT_ATTRIBUTE.to_string()],
        // a root DSE query yields one entry, two is enough to notice more
        size_limit: 2,
        time_limit: 90,
    }
}

/// Ask the server for its defaultNamingContext
pub async fn search_for_default_naming_context(
    ctx: &ProbeContext,
    client: &dyn DirectoryClient,
) -> Result<String> {
    let request = default_naming_context_request();
    let entries = ctx
        .run(client.search(ctx, &request))
        .await
        .map_err(|e| match e {
            Error::Dial { .. } => e,
            Error::Bind { username, detail } => Error::Directory(format!(
                "error binding as {:?} before querying for defaultNamingContext: {}",
                username, detail
            )),
            other => root_dse_error(other.to_string()),
        })?;

    if entries.len() != 1 {
        return Err(root_dse_error(format!(
            "expected to find 1 entry but found {}",
            entries.len()
        )));
    }

    let search_base = entries[0].first_value(DEFAULT_NAMING_CONTEXT_ATTRIBUTE);
    if search_base.is_empty() {
        return Err(root_dse_error("empty search base DN found".to_string()));
    }
    Ok(search_base)
}

fn root_dse_error(detail: String) -> Error {
    Error::Directory(format!(
        "error querying RootDSE for defaultNamingContext: {}",
        detail
    ))
}

#[async_trait]
impl GenericLdapUpstream for ActiveDirectoryIdentityProvider {
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
            filter: or_default(&user_search.filter, DEFAULT_USER_SEARCH_FILTER),
            username_attribute: or_default(
                &user_search.attributes.username,
                DEFAULT_USERNAME_ATTRIBUTE,
            ),
            uid_attribute: or_default(&user_search.attributes.uid, DEFAULT_UID_ATTRIBUTE),
        };
        config.group_search = GroupSearchConfig {
            base: group_search.base.clone(),
            filter: or_default(&group_search.filter, DEFAULT_GROUP_SEARCH_FILTER),
            group_name_attribute: or_default(
                &group_search.attributes.group_name,
                DEFAULT_GROUP_NAME_ATTRIBUTE,
            ),
            skip_group_refresh: group_search.skip_group_refresh,
        };

        config.uid_attribute_parsing_overrides = HashMap::from([(
            DEFAULT_UID_ATTRIBUTE.to_string(),
            microsoft_uuid_from_binary_attr(DEFAULT_UID_ATTRIBUTE),
        )]);

        // only the defaulted group name attribute gets the domain suffix
        if group_search.attributes.group_name.is_empty() {
            config.group_attribute_parsing_overrides = HashMap::from([(
                SAM_ACCOUNT_NAME_ATTRIBUTE.to_string(),
                group_sam_account_name_parser(),
            )]);
        }

        config.refresh_attribute_checks = HashMap::from([
            (
                PWD_LAST_SET_ATTRIBUTE.to_string(),
                attribute_unchanged_since_login(PWD_LAST_SET_ATTRIBUTE),
            ),
            (
                USER_ACCOUNT_CONTROL_ATTRIBUTE.to_string(),
                user_account_control_check(),
            ),
            (
                USER_ACCOUNT_CONTROL_COMPUTED_ATTRIBUTE.to_string(),
                computed_user_account_control_check(),
            ),
        ]);

        config
    }

    async fn detect_and_set_search_base(
        &self,
        ctx: &ProbeContext,
        connector: &dyn DirectoryConnector,
        config: &ProviderConfig,
    ) -> Option<SearchBaseResolution> {
        if !self.spec.user_search.base.is_empty() && !self.spec.group_search.base.is_empty() {
            return Some(SearchBaseResolution {
                condition: Condition::success(
                    TYPE_SEARCH_BASE_FOUND,
                    REASON_USING_CONFIGURATION_FROM_SPEC,
                    "Using search base from ActiveDirectoryIdentityProvider config.",
                ),
                default_search_base: None,
            });
        }

        debug!(
            "Querying {} for defaultNamingContext of {} {}",
            config.address(),
            KIND,
            self.metadata.name
        );
        let client = connector.new_client(config.clone());
        let resolution = match search_for_default_naming_context(ctx, client.as_ref()).await {
            Ok(search_base) => {
                info!(
                    "Using defaultNamingContext {:?} as search base for {} {}",
                    search_base, KIND, self.metadata.name
                );
                SearchBaseResolution {
                    condition: Condition::success(
                        TYPE_SEARCH_BASE_FOUND,
                        REASON_SUCCESS,
                        "Successfully fetched defaultNamingContext to use as default search base from RootDSE.",
                    ),
                    default_search_base: Some(search_base),
                }
            }
            Err(e) => SearchBaseResolution {
                condition: Condition::failure(
                    TYPE_SEARCH_BASE_FOUND,
                    REASON_ERROR_FETCHING_SEARCH_BASE,
                    format!("Error finding search base: {}", e),
                ),
                default_search_base: None,
            },
        };
        Some(resolution)
    }
}
