//! Directory client backed by ldap3
//!
//! Each operation opens its own connection, binds with the service account and
//! unbinds when done. Callers bound the whole operation with a [`ProbeContext`];
//! the client uses what is left of that budget as its connect and operation
//! timeouts.

use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions};
use rustls::ClientConfig;
use std::sync::Arc;
use tracing::{debug, error};
use upstream_core::directory::{Entry, SearchRequest, SearchScope};
use upstream_core::tls::root_store_from_pem;
use upstream_core::{
    async_trait, ConnectionProtocol, DirectoryClient, DirectoryConnector, Error, ProbeContext,
    ProviderConfig, Result,
};

/// Builds [`Ldap3Client`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Connector;

impl Ldap3Connector {
    pub fn new() -> Self {
        Self
    }
}

impl DirectoryConnector for Ldap3Connector {
    fn new_client(&self, config: ProviderConfig) -> Arc<dyn DirectoryClient> {
        Arc::new(Ldap3Client::new(config))
    }
}

/// LDAP client for one upstream
#[derive(Debug)]
pub struct Ldap3Client {
    config: ProviderConfig,
}

/// URL to dial and whether to upgrade it with StartTLS
pub fn ldap_url(config: &ProviderConfig) -> (String, bool) {
    let address = config.address();
    match config.connection_protocol {
        ConnectionProtocol::Tls => (format!("ldaps://{}", address), false),
        ConnectionProtocol::StartTls => (format!("ldap://{}", address), true),
    }
}

fn to_ldap3_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

fn to_entry(search_entry: SearchEntry) -> Entry {
    let mut entry = Entry::new(&search_entry.dn);
    for (name, values) in search_entry.attrs {
        entry
            .attributes
            .insert(name, values.into_iter().map(String::into_bytes).collect());
    }
    for (name, values) in search_entry.bin_attrs {
        entry.attributes.insert(name, values);
    }
    entry
}

impl Ldap3Client {
    /// Create a new client for `config`
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn settings(&self, ctx: &ProbeContext, starttls: bool) -> Result<LdapConnSettings> {
        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(ctx.remaining())
            .set_starttls(starttls);

        if let Some(ca_bundle) = &self.config.ca_bundle {
            let roots = root_store_from_pem(ca_bundle)?;
            let tls_config = ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(roots)
                .with_no_client_auth();
            settings = settings.set_config(Arc::new(tls_config));
        }
        Ok(settings)
    }

    /// Dial the server and bind as the service account
    async fn connect(&self, ctx: &ProbeContext) -> Result<Ldap> {
        let address = self.config.address();
        let (url, starttls) = ldap_url(&self.config);
        let settings = self.settings(ctx, starttls)?;

        debug!(
            "Connecting to {} for upstream {} using {}",
            url, self.config.name, self.config.connection_protocol
        );

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| Error::Dial {
                address,
                detail: e.to_string(),
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                error!("LDAP connection driver error: {}", e);
            }
        });

        ldap.with_timeout(ctx.remaining())
            .simple_bind(&self.config.bind_username, &self.config.bind_password)
            .await
            .and_then(|result| result.success())
            .map_err(|e| Error::Bind {
                username: self.config.bind_username.clone(),
                detail: e.to_string(),
            })?;

        Ok(ldap)
    }

    async fn close(mut ldap: Ldap) {
        if let Err(e) = ldap.unbind().await {
            debug!("LDAP unbind failed: {}", e);
        }
    }
}

#[async_trait]
impl DirectoryClient for Ldap3Client {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn test_connection(&self, ctx: &ProbeContext) -> Result<()> {
        let ldap = self.connect(ctx).await?;
        Self::close(ldap).await;
        Ok(())
    }

    async fn search(&self, ctx: &ProbeContext, request: &SearchRequest) -> Result<Vec<Entry>> {
        let mut ldap = self.connect(ctx).await?;

        let options = SearchOptions::new()
            .sizelimit(request.size_limit)
            .timelimit(request.time_limit);
        let result = ldap
            .with_timeout(ctx.remaining())
            .with_search_options(options)
            .search(
                &request.base_dn,
                to_ldap3_scope(request.scope),
                &request.filter,
                &request.attributes,
            )
            .await
            .and_then(|result| result.success());
        Self::close(ldap).await;

        let (entries, _) = result.map_err(|e| Error::Directory(e.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|entry| to_entry(SearchEntry::construct(entry)))
            .collect())
    }
}
