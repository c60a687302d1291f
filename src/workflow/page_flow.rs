//! 页面处理流程 - 流程层
//!
//! 核心职责：定义"一页"的完整处理流程
//!
//! 流程顺序：
//! 1. 渲染提示词
//! 2. 调用模型（带超时）
//! 3. 提取（strict → repair → 失败兜底）
//!
//! 无论哪一步出错，都返回一个合法的页面记录，不会让整个提交失败。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, LlmError};
use crate::models::input::PageInput;
use crate::models::prompt::{PromptVersion, SYSTEM_PROMPT};
use crate::models::submission::DegradedKind;
use crate::services::extraction::{Extraction, Extractor};
use crate::services::llm_service::{ScoringModel, ScoringRequest};
use crate::utils::logging::truncate_text;
use crate::workflow::page_ctx::PageCtx;

/// 页面处理流程
///
/// - 编排单页的评分流程
/// - 不持有提交状态
/// - 只依赖业务能力（services）
pub struct PageFlow {
    model: Arc<dyn ScoringModel>,
    extractor: Extractor,
    timeout: Duration,
    verbose_logging: bool,
}

impl PageFlow {
    pub fn new(model: Arc<dyn ScoringModel>, extractor: Extractor, config: &Config) -> Self {
        Self {
            model,
            extractor,
            timeout: config.llm_timeout(),
            verbose_logging: config.verbose_logging,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub async fn run(&self, page: &PageInput, prompt: &PromptVersion, ctx: &PageCtx) -> Extraction {
        let started = Instant::now();
        self.log_page(ctx, page);

        let request = ScoringRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            prompt: prompt.render(page),
            images: page.image.iter().cloned().collect(),
        };

        let raw = match tokio::time::timeout(self.timeout, self.model.score_page(&request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                let kind = if e.is_timeout() {
                    DegradedKind::UpstreamTimeout
                } else {
                    DegradedKind::UpstreamError
                };
                warn!("{} ❌ 模型调用失败: {}", ctx, e);
                return Extraction::failed(ctx.page_index, kind, e.to_string());
            }
            Err(_) => {
                let e = AppError::Llm(LlmError::Timeout {
                    model: self.model.model_name().to_string(),
                    timeout_secs: self.timeout.as_secs(),
                });
                warn!("{} ⏱️ {}", ctx, e);
                return Extraction::failed(ctx.page_index, DegradedKind::UpstreamTimeout, e.to_string());
            }
        };

        if self.verbose_logging {
            debug!("{} 模型原始响应: {}", ctx, truncate_text(&raw, 300));
        }

        let extraction = self.extractor.extract(&raw, &ctx.extraction_ctx());
        let record = &extraction.record;
        match record.skip_reason() {
            Some(reason) => info!("{} ⏭️ 跳过 ({})", ctx, reason),
            None => info!(
                "{} ✓ 评分完成: {} 项评分, {} 个问题, 用时 {:.1}s ({})",
                ctx,
                record.scores.len(),
                record.violations.len(),
                started.elapsed().as_secs_f32(),
                record.extraction
            ),
        }
        extraction
    }

    /// 显示页面预览
    fn log_page(&self, ctx: &PageCtx, page: &PageInput) {
        info!(
            "{} 📄 {} 词{}: {}",
            ctx,
            page.text.split_whitespace().count(),
            if page.has_image() { " + 图片" } else { "" },
            truncate_text(page.text.trim(), 60)
        );
    }
}
