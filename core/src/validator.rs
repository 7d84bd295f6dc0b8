//! Validation of generic LDAP upstreams
//!
//! [`GenericLdapValidator::validate`] runs the secret and TLS checks, then either
//! reuses cached connection settings or probes the directory, and returns the
//! ordered conditions together with the finished [`ProviderConfig`].
//! [`evaluate_conditions`] turns that outcome into a publication decision.

use crate::cache::{ValidatedSettings, ValidatedSettingsCache};
use crate::condition::{
    Condition, GradatedConditions, REASON_LDAP_CONNECTION_ERROR, REASON_SUCCESS,
    TYPE_LDAP_CONNECTION_VALID,
};
use crate::context::{ProbeContext, PROBE_LDAP_TIMEOUT};
use crate::directory::{DirectoryClient, DirectoryConnector};
use crate::provider::{ConnectionProtocol, ProviderConfig};
use crate::secret::{validate_secret, SecretLookup};
use crate::tls::validate_tls_config;
use crate::upstream::GenericLdapUpstream;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one connection probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProbe {
    pub condition: Condition,
    /// Protocol the published client should use
    pub protocol: ConnectionProtocol,
}

/// Dial and bind, trying TLS first and StartTLS second.
///
/// When both attempts fail the probe reports TLS together with the TLS error.
pub async fn test_connection(
    ctx: &ProbeContext,
    connector: &dyn DirectoryConnector,
    bind_secret_name: &str,
    config: &ProviderConfig,
    current_secret_version: &str,
) -> ConnectionProbe {
    let tls_config = config.with_protocol(ConnectionProtocol::Tls);
    let tls_address = tls_config.address();
    let mut result = attempt(ctx, connector, tls_config).await;
    let mut protocol = ConnectionProtocol::Tls;

    if let Err(tls_err) = result {
        info!(
            "Testing LDAP connection to {} using TLS failed, trying again with StartTLS: {}",
            tls_address, tls_err
        );

        let start_tls_config = config.with_protocol(ConnectionProtocol::StartTls);
        let start_tls_address = start_tls_config.address();
        match attempt(ctx, connector, start_tls_config).await {
            Ok(()) => {
                info!(
                    "Testing LDAP connection to {} using StartTLS succeeded",
                    start_tls_address
                );
                protocol = ConnectionProtocol::StartTls;
                result = Ok(());
            }
            Err(start_tls_err) => {
                warn!(
                    "Testing LDAP connection to {} using StartTLS also failed: {}",
                    start_tls_address, start_tls_err
                );
                result = Err(tls_err);
            }
        }
    }

    let condition = match result {
        Ok(()) => Condition::success(
            TYPE_LDAP_CONNECTION_VALID,
            REASON_SUCCESS,
            format!(
                "successfully able to connect to {:?} and bind as user {:?} [validated with Secret {:?} at version {:?}]",
                config.host, config.bind_username, bind_secret_name, current_secret_version
            ),
        ),
        Err(e) => Condition::failure(
            TYPE_LDAP_CONNECTION_VALID,
            REASON_LDAP_CONNECTION_ERROR,
            format!(
                "could not successfully connect to {:?} and bind as user {:?}: {}",
                config.host, config.bind_username, e
            ),
        ),
    };

    ConnectionProbe { condition, protocol }
}

async fn attempt(
    ctx: &ProbeContext,
    connector: &dyn DirectoryConnector,
    config: ProviderConfig,
) -> Result<()> {
    let client = connector.new_client(config);
    ctx.run(client.test_connection(ctx)).await
}

/// Conditions and configuration produced by validating one upstream
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub conditions: GradatedConditions,
    pub config: ProviderConfig,
}

/// Validates upstreams against shared secret lookup, cache and directory connector
pub struct GenericLdapValidator {
    secrets: Arc<dyn SecretLookup>,
    cache: Arc<dyn ValidatedSettingsCache>,
    connector: Arc<dyn DirectoryConnector>,
    probe_timeout: Duration,
}

impl GenericLdapValidator {
    pub fn new(
        secrets: Arc<dyn SecretLookup>,
        cache: Arc<dyn ValidatedSettingsCache>,
        connector: Arc<dyn DirectoryConnector>,
    ) -> Self {
        Self {
            secrets,
            cache,
            connector,
            probe_timeout: PROBE_LDAP_TIMEOUT,
        }
    }

    /// Override the budget of each probe
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn connector(&self) -> &Arc<dyn DirectoryConnector> {
        &self.connector
    }

    /// Validate one upstream.
    ///
    /// Only an unexpected secret lookup failure is returned as an error; every
    /// other problem is reported through the conditions.
    pub async fn validate(
        &self,
        parent: &CancellationToken,
        upstream: &dyn GenericLdapUpstream,
    ) -> Result<ValidationOutcome> {
        let mut config = upstream.provider_config();
        let mut conditions = GradatedConditions::new();

        let secret = validate_secret(
            self.secrets.as_ref(),
            upstream.bind_secret_name(),
            upstream.namespace(),
        )?;
        if let Some(credentials) = secret.credentials {
            config.apply_bind_credentials(credentials);
        }
        let secret_valid = secret.condition.is_true();
        conditions.append(secret.condition, true);

        let tls = validate_tls_config(upstream.tls_spec());
        if let Some(ca_bundle) = tls.ca_bundle {
            config.ca_bundle = Some(ca_bundle);
        }
        let tls_valid = tls.condition.is_true();
        conditions.append(tls.condition, true);

        if secret_valid && tls_valid {
            let (connection_condition, search_base_condition) = self
                .validate_connection_and_search_base(
                    parent,
                    upstream,
                    &mut config,
                    &secret.resource_version,
                )
                .await;
            conditions.append(connection_condition, false);
            if let Some(condition) = search_base_condition {
                conditions.append(condition, true);
            }
        } else {
            debug!(
                "Skipping connection probe for {} {}: configuration is invalid",
                upstream.kind(),
                upstream.name()
            );
        }

        Ok(ValidationOutcome { conditions, config })
    }

    async fn validate_connection_and_search_base(
        &self,
        parent: &CancellationToken,
        upstream: &dyn GenericLdapUpstream,
        config: &mut ProviderConfig,
        current_secret_version: &str,
    ) -> (Condition, Option<Condition>) {
        let name = upstream.name();
        let generation = upstream.generation();

        if let Some(cached) = self.cache.get(name, current_secret_version, generation) {
            debug!(
                "Using cached settings for {} {} at generation {}",
                upstream.kind(),
                name,
                generation
            );
            config.connection_protocol = cached.connection_protocol;
            config.user_search.base = cached.user_search_base;
            config.group_search.base = cached.group_search_base;
            return (
                cached.connection_valid_condition,
                cached.search_base_found_condition,
            );
        }

        debug!(
            "No usable cached settings for {} {}, probing {}",
            upstream.kind(),
            name,
            config.host
        );

        let probe = {
            let ctx = ProbeContext::with_timeout(parent, self.probe_timeout);
            test_connection(
                &ctx,
                self.connector.as_ref(),
                upstream.bind_secret_name(),
                config,
                current_secret_version,
            )
            .await
        };
        config.connection_protocol = probe.protocol;

        let resolution = {
            let ctx = ProbeContext::with_timeout(parent, self.probe_timeout);
            upstream
                .detect_and_set_search_base(&ctx, self.connector.as_ref(), config)
                .await
        };
        let search_base_condition = resolution.map(|resolution| {
            if let Some(base) = resolution.default_search_base.as_deref() {
                config.apply_default_search_base(base);
            }
            resolution.condition
        });

        let search_base_ok = search_base_condition
            .as_ref()
            .map_or(true, Condition::is_true);
        if probe.condition.is_true() && search_base_ok {
            self.cache.set(
                name,
                ValidatedSettings {
                    upstream_name: name.to_string(),
                    idp_spec_generation: generation,
                    bind_secret_resource_version: current_secret_version.to_string(),
                    connection_protocol: config.connection_protocol,
                    user_search_base: config.user_search.base.clone(),
                    group_search_base: config.group_search.base.clone(),
                    connection_valid_condition: probe.condition.clone(),
                    search_base_found_condition: search_base_condition.clone(),
                },
            );
        }

        (probe.condition, search_base_condition)
    }
}

/// Decide whether to publish a client and whether to retry.
///
/// Any failing fatal condition withholds the client. A failing advisory
/// condition still publishes it but asks for another pass.
pub fn evaluate_conditions(
    conditions: &GradatedConditions,
    config: &ProviderConfig,
    connector: &dyn DirectoryConnector,
) -> (Option<Arc<dyn DirectoryClient>>, bool) {
    if conditions.has_fatal_failure() {
        return (None, true);
    }
    let client = connector.new_client(config.clone());
    (Some(client), conditions.has_warning())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{
        REASON_SECRET_NOT_FOUND, TYPE_BIND_SECRET_VALID, TYPE_SEARCH_BASE_FOUND,
    };
    use crate::testing::FakeConnector;

    fn connection(ok: bool) -> Condition {
        if ok {
            Condition::success(TYPE_LDAP_CONNECTION_VALID, REASON_SUCCESS, "ok")
        } else {
            Condition::failure(TYPE_LDAP_CONNECTION_VALID, REASON_LDAP_CONNECTION_ERROR, "down")
        }
    }

    #[test]
    fn test_fatal_failure_withholds_client() {
        let connector = FakeConnector::new();
        let mut conditions = GradatedConditions::new();
        conditions.append(
            Condition::failure(TYPE_BIND_SECRET_VALID, REASON_SECRET_NOT_FOUND, "missing"),
            true,
        );
        conditions.append(connection(true), false);

        let (client, requeue) =
            evaluate_conditions(&conditions, &ProviderConfig::default(), &connector);
        assert!(client.is_none());
        assert!(requeue);
        assert_eq!(connector.clients_created(), 0);
    }

    #[test]
    fn test_advisory_failure_publishes_and_requeues() {
        let connector = FakeConnector::new();
        let mut conditions = GradatedConditions::new();
        conditions.append(
            Condition::success(TYPE_BIND_SECRET_VALID, REASON_SUCCESS, "loaded bind secret"),
            true,
        );
        conditions.append(connection(false), false);

        let config = ProviderConfig::new("idp", "uid", "ldap.example.com");
        let (client, requeue) = evaluate_conditions(&conditions, &config, &connector);
        assert_eq!(client.map(|c| c.name().to_string()), Some("idp".to_string()));
        assert!(requeue);
    }

    #[test]
    fn test_all_true_publishes_without_requeue() {
        let connector = FakeConnector::new();
        let mut conditions = GradatedConditions::new();
        conditions.append(connection(true), false);
        conditions.append(
            Condition::success(TYPE_SEARCH_BASE_FOUND, REASON_SUCCESS, "found"),
            true,
        );

        let (client, requeue) =
            evaluate_conditions(&conditions, &ProviderConfig::default(), &connector);
        assert!(client.is_some());
        assert!(!requeue);
    }
}
