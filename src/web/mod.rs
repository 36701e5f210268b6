//! # Web Integration
//!
//! axum middleware that times each request, hands handlers a per-request
//! [`QueryLog`](crate::query_log::QueryLog), and reports slow requests.

pub mod middleware;

pub use middleware::{
    apply_middleware_stack, apply_profiling_layer, profile_request, RequestProfiler,
};
