//! Target locks and record-mutation guards.
//!
//! # Target Locks
//!
//! A running event holds exactly one lock file, `locks/<target-key>.lock`.
//! Lock files are created with **create_new** semantics (exclusive create), so
//! of any number of processes racing for the same target exactly one wins.
//! The file is removed by the event's close path and by nothing else, except
//! an explicit operator `lock clear`. Locks never expire: a holder that dies
//! without closing leaves its lock behind until an operator reconciles it.
//!
//! # Lock Metadata
//!
//! Each lock file contains JSON metadata naming the holder:
//! - `event_id`: the running event that owns the target
//! - `target`, `kind`, `owner`: copied from the event for diagnostics
//! - `pid`, `instance`: the holding process (`user@HOST`)
//! - `created_at`: RFC3339 timestamp
//!
//! # Mutation Guards
//!
//! Short read-modify-write sections on a single record (e.g. deactivating a
//! block) take a `<name>.guard` file through an RAII [`LockGuard`] that
//! deletes it when dropped.

mod guard;
mod metadata;
mod operations;
mod types;


pub use guard::LockGuard;
pub use metadata::{LockMetadata, instance_string};
pub use operations::{
    acquire_guard, acquire_target_lock, clear_lock, list_locks, read_target_lock,
    release_target_lock,
};
pub use types::LockInfo;
