//! Upstream watcher
//!
//! A sync pass validates every declared upstream concurrently, records the
//! resulting status, and replaces the published client set in one step.

use crate::active_directory::ActiveDirectoryIdentityProvider;
use crate::ldap::LdapIdentityProvider;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use upstream_core::status::build_status;
use upstream_core::{
    evaluate_conditions, CancellationToken, Config, Error, GenericLdapUpstream,
    GenericLdapValidator, ProviderRegistry, Result, UpstreamStatus,
};

/// Counts from one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Upstreams whose client was published
    pub published: usize,
    /// Upstreams withheld because of a fatal condition
    pub withheld: usize,
    /// Whether any upstream asked to be evaluated again
    pub requeue_requested: bool,
}

impl SyncReport {
    /// Turn a requested requeue into [`Error::Requeue`]
    pub fn check(self) -> Result<Self> {
        if self.requeue_requested {
            return Err(Error::Requeue);
        }
        Ok(self)
    }
}

/// Keeps the provider registry in line with the declared upstreams
pub struct UpstreamWatcher {
    validator: Arc<GenericLdapValidator>,
    registry: Arc<ProviderRegistry>,
    statuses: DashMap<String, UpstreamStatus>,
}

impl UpstreamWatcher {
    pub fn new(validator: Arc<GenericLdapValidator>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            validator,
            registry,
            statuses: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Last recorded status of an upstream
    pub fn status(&self, name: &str) -> Option<UpstreamStatus> {
        self.statuses.get(name).map(|status| status.clone())
    }

    /// Snapshot of every recorded status, sorted by upstream name
    pub fn statuses(&self) -> Vec<(String, UpstreamStatus)> {
        let mut statuses: Vec<(String, UpstreamStatus)> = self
            .statuses
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    /// Validate all upstreams and publish the usable ones.
    ///
    /// The registry is always replaced, even when some upstream hit an
    /// unexpected error; that error is returned afterwards.
    pub async fn sync_pass(
        &self,
        parent: &CancellationToken,
        upstreams: Vec<Arc<dyn GenericLdapUpstream>>,
    ) -> Result<SyncReport> {
        let mut tasks = JoinSet::new();
        for upstream in upstreams {
            let validator = Arc::clone(&self.validator);
            let parent = parent.clone();
            tasks.spawn(async move {
                let outcome = validator.validate(&parent, upstream.as_ref()).await;
                (upstream, outcome)
            });
        }

        let mut report = SyncReport::default();
        let mut clients = Vec::new();
        let mut first_error = None;
        let mut seen = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let (upstream, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("Upstream validation task failed: {}", e);
                    if first_error.is_none() {
                        first_error = Some(Error::Generic(e.to_string()));
                    }
                    continue;
                }
            };
            let name = upstream.name().to_string();
            seen.push(name.clone());

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Error validating {} {}: {}", upstream.kind(), name, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    continue;
                }
            };

            let (client, requeue) = evaluate_conditions(
                &outcome.conditions,
                &outcome.config,
                self.validator.connector().as_ref(),
            );
            report.requeue_requested |= requeue;
            match client {
                Some(client) => {
                    report.published += 1;
                    clients.push(client);
                }
                None => {
                    report.withheld += 1;
                    warn!(
                        "Withholding {} {}: configuration is not usable",
                        upstream.kind(),
                        name
                    );
                }
            }

            let previous = self
                .status(&name)
                .map(|status| status.conditions)
                .unwrap_or_else(|| upstream.conditions().to_vec());
            let status = build_status(
                &previous,
                &outcome.conditions,
                upstream.generation(),
                Utc::now(),
            );
            debug!("Status of {} {} is {}", upstream.kind(), name, status.phase);
            self.statuses.insert(name, status);
        }

        self.statuses.retain(|name, _| seen.contains(name));
        self.registry.replace_all(clients);
        info!(
            "Sync pass finished: {} published, {} withheld",
            report.published, report.withheld
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Run a sync pass and report a requested requeue as an error
    pub async fn sync(
        &self,
        parent: &CancellationToken,
        upstreams: Vec<Arc<dyn GenericLdapUpstream>>,
    ) -> Result<SyncReport> {
        self.sync_pass(parent, upstreams).await?.check()
    }

    /// Repeat sync passes every `interval` until `token` is cancelled
    pub async fn run(
        &self,
        token: CancellationToken,
        upstreams: Vec<Arc<dyn GenericLdapUpstream>>,
        interval: Duration,
    ) {
        loop {
            match self.sync(&token, upstreams.clone()).await {
                Ok(report) => debug!("All {} upstreams are healthy", report.published),
                Err(Error::Requeue) => info!("Some upstreams need another pass"),
                Err(e) => error!("Sync pass failed: {}", e),
            }

            tokio::select! {
                _ = token.cancelled() => {
                    info!("Upstream watcher stopping");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

/// Build the upstreams declared in a configuration file
pub fn upstreams_from_config(config: &Config) -> Vec<Arc<dyn GenericLdapUpstream>> {
    let namespace = &config.settings.namespace;
    let ldap = config.ldap.iter().map(|upstream| {
        Arc::new(LdapIdentityProvider::new(
            upstream.metadata(namespace),
            upstream.spec.clone(),
        )) as Arc<dyn GenericLdapUpstream>
    });
    let active_directory = config.active_directory.iter().map(|upstream| {
        Arc::new(ActiveDirectoryIdentityProvider::new(
            upstream.metadata(namespace),
            upstream.spec.clone(),
        )) as Arc<dyn GenericLdapUpstream>
    });
    ldap.chain(active_directory).collect()
}
