//! API Module
//!
//! Admin HTTP surface: inspect, write and invalidate cache entries.

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
