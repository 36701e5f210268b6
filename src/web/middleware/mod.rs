//! # Web Middleware
//!
//! Middleware stack for profiled routers: request tracing plus slow request
//! reporting.

pub mod query_timing;

use axum::middleware;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use query_timing::{profile_request, RequestProfiler};

/// Install only the slow request profiler
pub fn apply_profiling_layer<S>(router: Router<S>, profiler: RequestProfiler) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(profiler, profile_request))
}

/// Apply the profiling middleware stack
///
/// Layers, innermost first:
/// 1. Slow request profiling
/// 2. Request tracing
pub fn apply_middleware_stack<S>(router: Router<S>, profiler: RequestProfiler) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    apply_profiling_layer(router, profiler).layer(TraceLayer::new_for_http())
}
