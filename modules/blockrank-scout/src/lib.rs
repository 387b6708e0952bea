pub mod batch;
pub mod browser;
pub mod identity;
pub mod infra;
pub mod matcher;
pub mod scrape;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod volume;

pub use batch::{BatchDeps, BatchSummary, BatchUpdater};
pub use traits::{RankSource, RecordStore, VolumeSource};
