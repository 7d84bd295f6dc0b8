//! LDAP Upstream Modules
//!
//! The upstream kinds known to the watcher, a directory client built on ldap3,
//! and the watcher that keeps the published provider set current.

pub mod active_directory;
pub mod client;
pub mod ldap;
pub mod watcher;

pub use active_directory::ActiveDirectoryIdentityProvider;
pub use client::{Ldap3Client, Ldap3Connector};
pub use ldap::LdapIdentityProvider;
pub use watcher::{upstreams_from_config, SyncReport, UpstreamWatcher};
