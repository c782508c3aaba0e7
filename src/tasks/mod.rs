//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside a group.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired cached results at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;
