//! docsync: content-addressed synchronization between a local PDF corpus and
//! a remote document store.
//!
//! Before a policy manual is handed to the remote analysis service, docsync
//! decides whether an equivalent copy already exists in remote storage and
//! reuses the existing handle instead of re-uploading. The durable mapping
//! from content fingerprint to remote handle lives in [`index::SyncIndex`];
//! [`reconcile::Reconciler`] drives one full scan-compare-upload cycle.

pub mod cmd;
pub mod config;
pub mod corpus;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod index;
pub mod pass_lock;
pub mod reconcile;
pub mod remote;
pub mod remote_http;
pub mod util;

pub use error::{Error, Result};
