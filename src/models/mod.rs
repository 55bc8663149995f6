//! Request and response models for the admin API

pub mod requests;
pub mod responses;

pub use requests::{PatternQuery, SetRequest};
pub use responses::{
    ClearResponse, DeleteResponse, ErrorResponse, GetResponse, HealthResponse,
    PatternDeleteResponse, SetResponse, StatsResponse, TagInvalidateResponse,
};
