//! Simulated eviction policies.
//!
//! | Policy   | Module      | Notes                                     |
//! |----------|-------------|-------------------------------------------|
//! | LRU      | [`lru`]     | byte capacity, optional ttl               |
//! | FIFO     | [`fifo`]    | byte capacity, optional ttl               |
//! | L2Cache  | [`l2cache`] | segmented, heuristic or learned selection |

pub mod fifo;
mod keyed_queue;
pub mod l2cache;
pub mod lru;
