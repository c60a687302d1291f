//! 基础设施层
//!
//! 持有每个提交的可变状态，只暴露记录、聚合和复核能力

pub mod store;

pub use store::{PendingOverride, SubmissionState, SubmissionStore};
