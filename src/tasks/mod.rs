//! Background Tasks Module
//!
//! Contains work that runs outside any request.
//!
//! # Tasks
//! - Expiry sweep: Removes expired entries from the local fallback map
//! - Worker pool: Runs refresh-ahead and revalidation work with bounded concurrency

mod cleanup;
mod pool;

pub use cleanup::spawn_cleanup_task;
pub use pool::WorkerPool;
