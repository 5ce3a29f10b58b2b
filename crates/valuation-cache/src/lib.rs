//! # Valuation Cache
//!
//! 物料彙總快取與髒標記追蹤

pub mod dirty_tracking;
pub mod summary_cache;

// Re-export 主要類型
pub use dirty_tracking::DirtyTracker;
pub use summary_cache::SummaryCache;
