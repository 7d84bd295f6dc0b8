//! Scriptable in-memory directory for tests
//!
//! [`FakeConnector`] hands out [`FakeClient`]s that share one script: how a dial
//! with each protocol behaves and what a search returns. Every dial and search is
//! recorded so tests can assert on exactly what was attempted.

use crate::context::ProbeContext;
use crate::directory::{DirectoryClient, DirectoryConnector, Entry, SearchRequest};
use crate::provider::{ConnectionProtocol, ProviderConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// How a scripted dial behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialOutcome {
    Succeed,
    /// Fail to reach the server with the given error text
    Fail(String),
    /// Reach the server but fail the bind with the given error text
    BindFail(String),
    /// Never complete; only the probe context ends the attempt
    Hang,
}

/// How a scripted search behaves once the dial succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Entries(Vec<Entry>),
    Fail(String),
}

/// One recorded dial attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialAttempt {
    pub address: String,
    pub protocol: ConnectionProtocol,
    pub bind_username: String,
    pub bind_password: String,
    pub ca_bundle: Option<Vec<u8>>,
}

#[derive(Debug)]
struct Script {
    tls: DialOutcome,
    start_tls: DialOutcome,
    search: SearchOutcome,
    attempts: Vec<DialAttempt>,
    searches: Vec<SearchRequest>,
    clients_created: usize,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            tls: DialOutcome::Succeed,
            start_tls: DialOutcome::Succeed,
            search: SearchOutcome::Entries(Vec::new()),
            attempts: Vec::new(),
            searches: Vec::new(),
            clients_created: 0,
        }
    }
}

/// Connector whose clients follow a shared script
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    script: Arc<Mutex<Script>>,
}

impl FakeConnector {
    /// Both protocols succeed and searches return nothing
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tls(self, outcome: DialOutcome) -> Self {
        self.set_tls(outcome);
        self
    }

    pub fn with_start_tls(self, outcome: DialOutcome) -> Self {
        self.set_start_tls(outcome);
        self
    }

    pub fn with_search(self, outcome: SearchOutcome) -> Self {
        self.set_search(outcome);
        self
    }

    pub fn set_tls(&self, outcome: DialOutcome) {
        self.script.lock().tls = outcome;
    }

    pub fn set_start_tls(&self, outcome: DialOutcome) {
        self.script.lock().start_tls = outcome;
    }

    pub fn set_search(&self, outcome: SearchOutcome) {
        self.script.lock().search = outcome;
    }

    /// Every dial attempt so far, including the ones made by searches
    pub fn attempts(&self) -> Vec<DialAttempt> {
        self.script.lock().attempts.clone()
    }

    pub fn dial_count(&self) -> usize {
        self.script.lock().attempts.len()
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.script.lock().searches.clone()
    }

    pub fn clients_created(&self) -> usize {
        self.script.lock().clients_created
    }

    /// Forget recorded calls, keeping the script
    pub fn reset_counters(&self) {
        let mut script = self.script.lock();
        script.attempts.clear();
        script.searches.clear();
        script.clients_created = 0;
    }
}

impl DirectoryConnector for FakeConnector {
    fn new_client(&self, config: ProviderConfig) -> Arc<dyn DirectoryClient> {
        self.script.lock().clients_created += 1;
        Arc::new(FakeClient {
            config,
            script: Arc::clone(&self.script),
        })
    }
}

/// Client produced by [`FakeConnector`]
#[derive(Debug)]
pub struct FakeClient {
    config: ProviderConfig,
    script: Arc<Mutex<Script>>,
}

impl FakeClient {
    async fn dial(&self, ctx: &ProbeContext) -> Result<()> {
        let address = self.config.address();
        let outcome = {
            let mut script = self.script.lock();
            script.attempts.push(DialAttempt {
                address: address.clone(),
                protocol: self.config.connection_protocol,
                bind_username: self.config.bind_username.clone(),
                bind_password: self.config.bind_password.clone(),
                ca_bundle: self.config.ca_bundle.clone(),
            });
            match self.config.connection_protocol {
                ConnectionProtocol::Tls => script.tls.clone(),
                ConnectionProtocol::StartTls => script.start_tls.clone(),
            }
        };

        match outcome {
            DialOutcome::Succeed => Ok(()),
            DialOutcome::Fail(detail) => Err(Error::Dial { address, detail }),
            DialOutcome::BindFail(detail) => Err(Error::Bind {
                username: self.config.bind_username.clone(),
                detail,
            }),
            DialOutcome::Hang => ctx.run(std::future::pending::<Result<()>>()).await,
        }
    }
}

#[async_trait]
impl DirectoryClient for FakeClient {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn test_connection(&self, ctx: &ProbeContext) -> Result<()> {
        self.dial(ctx).await
    }

    async fn search(&self, ctx: &ProbeContext, request: &SearchRequest) -> Result<Vec<Entry>> {
        self.dial(ctx).await?;
        let outcome = {
            let mut script = self.script.lock();
            script.searches.push(request.clone());
            script.search.clone()
        };
        match outcome {
            SearchOutcome::Entries(entries) => Ok(entries),
            SearchOutcome::Fail(message) => Err(Error::Directory(message)),
        }
    }
}
