//! 提取与规范化层 - 业务能力层
//!
//! 把模型返回的原始文本转换成经过校验的 `PageRecord`。
//! 策略按顺序尝试（strict → repair），全部失败时生成跳过页；
//! 调用方永远拿到一个合法记录，不会收到未经校验的文本，也不会收到错误。

pub mod normalize;
pub mod repair;
pub mod strict;

use std::fmt::Display;

use crate::error::AppResult;
use crate::models::page::{ExtractionMethod, PageRecord};
use crate::models::submission::{DegradedExtraction, DegradedKind};

pub use repair::RepairStrategy;
pub use strict::StrictStrategy;

/// 全部策略失败时的跳过原因
pub const REASON_EXTRACTION_FAILED: &str = "extraction failed";

/// 提取上下文
#[derive(Debug, Clone, Copy)]
pub struct ExtractionCtx<'a> {
    pub submission_id: &'a str,
    pub page_index: u32,
}

impl<'a> ExtractionCtx<'a> {
    pub fn new(submission_id: &'a str, page_index: u32) -> Self {
        Self {
            submission_id,
            page_index,
        }
    }
}

impl Display for ExtractionCtx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[提交 {} 第 {} 页]", self.submission_id, self.page_index)
    }
}

/// 单个策略失败的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub reason: String,
}

impl StrategyFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Display for StrategyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// 提取策略
pub trait ExtractionStrategy: Send + Sync {
    fn method(&self) -> ExtractionMethod;

    fn extract(&self, raw: &str, ctx: &ExtractionCtx<'_>) -> Result<PageRecord, StrategyFailure>;
}

/// 一次提取的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub record: PageRecord,
    /// 非严格解析成功时记录降级事件
    pub degraded: Option<DegradedExtraction>,
}

impl Extraction {
    /// 上游失败（超时、API 错误）或提取失败时的跳过页
    pub fn failed(page_index: u32, kind: DegradedKind, detail: impl Into<String>) -> Self {
        Self {
            record: PageRecord::skipped(page_index, REASON_EXTRACTION_FAILED, ExtractionMethod::Failed),
            degraded: Some(DegradedExtraction {
                page_index,
                kind,
                detail: detail.into(),
            }),
        }
    }
}

/// 按顺序执行提取策略
pub struct Extractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Extractor {
    /// 默认策略链：strict → repair
    pub fn new() -> AppResult<Self> {
        Ok(Self::with_strategies(vec![
            Box::new(StrictStrategy),
            Box::new(RepairStrategy::new()?),
        ]))
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn extract(&self, raw: &str, ctx: &ExtractionCtx<'_>) -> Extraction {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            match strategy.extract(raw, ctx) {
                Ok(record) => {
                    let method = strategy.method();
                    let degraded = if method == ExtractionMethod::Strict {
                        None
                    } else {
                        tracing::warn!("{} ⚠️ 使用 {} 策略解析响应", ctx, method);
                        Some(DegradedExtraction {
                            page_index: ctx.page_index,
                            kind: DegradedKind::Repaired,
                            detail: failures.join("; "),
                        })
                    };
                    return Extraction { record, degraded };
                }
                Err(failure) => {
                    tracing::debug!("{} {} 策略失败: {}", ctx, strategy.method(), failure);
                    failures.push(format!("{}: {}", strategy.method(), failure));
                }
            }
        }

        tracing::warn!("{} ❌ 所有提取策略均失败", ctx);
        Extraction::failed(ctx.page_index, DegradedKind::Failed, failures.join("; "))
    }
}
