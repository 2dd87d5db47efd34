//! tollgate: audit, mutual-exclusion and cooperative cancellation for
//! control-plane operations, backed by a shared directory.
//!
//! Every guarded operation is an [`Event`](model::Event). Opening one takes
//! the lock on its target, closing it records the outcome and releases the
//! target, and a cancellation request written by any process is observed by
//! the worker through polling.
//!
//! ```no_run
//! use tollgate::admission::{Opts, open};
//! use tollgate::context::StoreContext;
//! use tollgate::model::{Kind, Owner};
//! use tollgate::permission::Allowed;
//! use serde_json::Value;
//!
//! let ctx = StoreContext::resolve(None)?;
//! let handle = open(
//!     &ctx,
//!     Opts::new(
//!         "app:foo".parse()?,
//!         Kind::permission("app.deploy"),
//!         Owner::user("alice"),
//!         Allowed::new("app.deploy.read.events", vec![]),
//!         Allowed::new("app.deploy.cancel", vec![]),
//!     ),
//! )?;
//! // ... guarded work, polling handle.cancel_requested() ...
//! handle.close(None, Value::Null)?;
//! # Ok::<(), tollgate::error::TollgateError>(())
//! ```

pub mod admission;
pub mod audit;
pub mod blocks;
pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod exit_codes;
pub mod filter;
pub mod fs;
pub mod journal;
pub mod locks;
pub mod model;
pub mod permission;
pub mod redact;

#[cfg(test)]
pub(crate) mod test_support;
