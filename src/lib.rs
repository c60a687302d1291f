//! # Rubric Grader
//!
//! 逐页调用 LLM 对启发式评估作业评分，并按评分细则聚合为提交级结果
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有每个提交的可变状态，只暴露能力
//! - `SubmissionStore` - 每个提交一把锁
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单页或纯数据
//! - `LlmService` - 模型调用能力
//! - `extraction` - 原始文本 → 页面记录
//! - `aggregation` - 页面记录 → 提交结果
//! - `ResultWriter` - 结果、复核日志、纠错记录与风险标记落盘
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一页"的完整处理流程
//! - `PageCtx` - 上下文封装（submission_id + page_index）
//! - `PageFlow` - 流程编排（render → model → extract）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量处理入口
//! - `orchestrator/engine` - 评分引擎（评分、聚合、复核、纠错记录、风险标记）
//! - `orchestrator/submission_processor` - 单个提交的并发调度
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{OverrideRecord, PageInput, PromptVersion, SubmissionInput, SubmissionResult};
pub use orchestrator::{App, GradingEngine};
pub use services::{ScoringModel, ScoringRequest};
pub use workflow::{PageCtx, PageFlow};
