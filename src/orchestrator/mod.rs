//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责并发调度和生命周期管理，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量提交处理器
//! - 管理应用生命周期（初始化、运行）
//! - 批量加载提交清单并回放人工复核
//! - 输出全局统计信息
//!
//! ### `engine` - 评分引擎
//! - 对外的评分、聚合、复核接口
//! - 持有所有提交的状态
//!
//! ### `submission_processor` - 单个提交处理器
//! - 每页一个任务，Semaphore 限制并发
//! - 等待全部页面返回后再聚合
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<SubmissionInput>)
//!     ↓
//! engine → submission_processor (处理 Vec<PageInput>)
//!     ↓
//! workflow::PageFlow (处理单页)
//!     ↓
//! services (能力层：llm / extraction / aggregation / writer)
//!     ↓
//! infrastructure (基础设施：SubmissionStore)
//! ```

pub mod batch_processor;
pub mod engine;
pub mod submission_processor;

pub use batch_processor::App;
pub use engine::GradingEngine;
pub use submission_processor::{process_submission, PageStats};
