//! Exit code constants for the tollgate CLI.
//!
//! - 0: Success (including "no content")
//! - 1: User error (bad args, store failure)
//! - 2: Event or active block not found
//! - 3: Unauthorized
//! - 4: Target locked by a running event
//! - 5: Operation forbidden by an active block
//! - 6: Event not cancelable
//! - 7: Guarded operation failed or was canceled

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid input, or store failure.
pub const USER_ERROR: i32 = 1;

/// Lookup miss for an event or an active block.
pub const NOT_FOUND: i32 = 2;

/// The caller is not authorized for the operation.
pub const UNAUTHORIZED: i32 = 3;

/// Lock acquisition failure: the target already has a running event.
pub const LOCK_FAILURE: i32 = 4;

/// An active block forbids the operation.
pub const BLOCKED: i32 = 5;

/// Cancellation was refused.
pub const NOT_CANCELABLE: i32 = 6;

/// The guarded work exited unsuccessfully or was canceled.
pub const OPERATION_FAILED: i32 = 7;
