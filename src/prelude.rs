pub use crate::builder::{Cache, CacheBuilder, CachePolicy};
pub use crate::ds::{IntrusiveList, SlotArena, SlotId};
pub use crate::error::{ConfigError, InvariantError, ModelError, ProfilerError};
pub use crate::metrics::CacheMetricsSnapshot;
pub use crate::policy::fifo::FifoCache;
pub use crate::policy::l2cache::{
    BucketType, FeatureMatrix, L2Cache, L2CacheParams, LearnerStats, ModelBackend, ObjScoreType,
    RidgeRegression, ScoringModel, ScoringPolicy, TrainingSet, TrainingSource,
};
pub use crate::policy::lru::LruCache;
pub use crate::profiler::{get_miss_ratio_curve, ProfilerParams, ProfilerResult};
pub use crate::request::{ObjKey, OnePassSource, Request, RequestSource, TraceBuffer};
pub use crate::traits::{CacheSim, CommonCacheParams, Lookup};
pub use crate::workload::{SizeModel, SyntheticSource, Workload, WorkloadSpec};
