//! Filesystem primitives for the shared store.
//!
//! The store relies on two atomic operations: exclusive create (the
//! conditional insert behind locks, blocks and cancel markers) and
//! write-then-rename (whole-record replacement). [`atomic_create`] combines
//! them for records that must never be seen half-written.

pub mod atomic;
mod exclusive;

pub use atomic::{atomic_create, atomic_write, atomic_write_json};
pub use exclusive::{CreateOutcome, create_exclusive};
