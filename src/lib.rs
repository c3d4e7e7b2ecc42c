//! cachesim: trace-driven cache simulation with classic and learned
//! eviction policies, plus a parallel miss-ratio-curve profiler.
//!
//! ```text
//!   RequestSource ──► Cache::get ──► hit: policy bookkeeping
//!                                └─► miss: insert, evict until it fits
//!                          │
//!                          ▼
//!                 CacheMetricsSnapshot ──► profiler::ProfilerResult per size bin
//! ```

pub mod builder;
pub mod ds;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod prelude;
pub mod profiler;
pub mod request;
pub mod traits;
pub mod workload;
