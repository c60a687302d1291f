//! 单个提交处理器 - 编排层
//!
//! ## 职责
//!
//! 1. **并发调度**：每页一个任务，Semaphore 限制同时在途的模型调用数
//! 2. **同步屏障**：等待所有页面任务返回（成功、降级或失败）后才聚合
//! 3. **故障隔离**：单页失败（超时、panic）降级为跳过页，不影响其他页面
//! 4. **统计输出**：记录评分/跳过/降级数量

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::SubmissionState;
use crate::models::input::SubmissionInput;
use crate::models::prompt::PromptVersion;
use crate::models::submission::{DegradedKind, SubmissionResult};
use crate::services::extraction::Extraction;
use crate::services::ResultWriter;
use crate::workflow::{PageCtx, PageFlow};

/// 页面处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageStats {
    pub scored: usize,
    pub skipped: usize,
    pub degraded: usize,
}

/// 处理单个提交
///
/// 所有页面都记录进状态后才调用 `finalize`，因此不会产生部分聚合结果。
pub async fn process_submission(
    flow: Arc<PageFlow>,
    prompt: Arc<PromptVersion>,
    input: &SubmissionInput,
    state: Arc<Mutex<SubmissionState>>,
    max_concurrent_pages: usize,
    writer: Option<&ResultWriter>,
) -> AppResult<SubmissionResult> {
    let page_count = input.pages.len();
    log_submission_start(&input.submission_id, page_count, &prompt, flow.model_name());

    let semaphore = Arc::new(Semaphore::new(max_concurrent_pages.max(1)));
    let mut handles = Vec::with_capacity(page_count);

    for page in &input.pages {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|e| AppError::Other(format!("并发信号量已关闭: {}", e)))?;

        let flow = Arc::clone(&flow);
        let prompt = Arc::clone(&prompt);
        let page = page.clone();
        let page_index = page.page_index;
        let ctx = PageCtx::new(input.submission_id.clone(), page_index, page_count);

        let handle = tokio::spawn(async move {
            let _permit = permit;
            flow.run(&page, &prompt, &ctx).await
        });
        handles.push((page_index, handle));
    }

    // 等待所有页面任务完成
    let mut stats = PageStats::default();
    for (page_index, handle) in handles {
        let extraction = match handle.await {
            Ok(extraction) => extraction,
            Err(e) => {
                error!(
                    "[提交 {}] 第 {} 页任务执行失败: {}",
                    input.submission_id, page_index, e
                );
                Extraction::failed(page_index, DegradedKind::Failed, format!("任务执行失败: {}", e))
            }
        };

        if extraction.record.is_skipped() {
            stats.skipped += 1;
        } else {
            stats.scored += 1;
        }
        if extraction.degraded.is_some() {
            stats.degraded += 1;
        }

        if let Some(writer) = writer {
            if let Err(e) = writer.write_page(&input.submission_id, &extraction.record).await {
                warn!("[提交 {}] 第 {} 页记录写入失败: {}", input.submission_id, page_index, e);
            }
        }

        state
            .lock()
            .await
            .record_page(extraction.record, extraction.degraded)?;
    }

    let result = state.lock().await.finalize()?;

    if let Some(writer) = writer {
        if let Err(e) = writer.write_result(&result).await {
            warn!("[提交 {}] ⚠️ 结果文件写入失败: {}", input.submission_id, e);
        }
    }

    log_submission_complete(&result, &stats);
    Ok(result)
}

// ========== 日志辅助函数 ==========

fn log_submission_start(submission_id: &str, page_count: usize, prompt: &PromptVersion, model: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📝 开始评分提交: {}", submission_id);
    info!("📄 页面数: {} | 提示词: {} | 模型: {}", page_count, prompt, model);
    info!("{}", "=".repeat(60));
}

fn log_submission_complete(result: &SubmissionResult, stats: &PageStats) {
    info!("\n{}", "─".repeat(60));
    info!("[提交 {}] 📊 评分完成", result.submission_id);
    info!(
        "✓ 评分页: {} | ⏭️ 跳过: {} | ⚠️ 降级: {}",
        stats.scored, stats.skipped, stats.degraded
    );
    info!(
        "🎯 总分: {}/{} (+加分) | 原则覆盖: {} 条 / 问题: {} 个",
        result.total_points,
        result.max_points,
        result.coverage.distinct_heuristics,
        result.coverage.total_violations
    );
    let unscored = result.unscored_criteria();
    if !unscored.is_empty() {
        let names: Vec<_> = unscored.iter().map(|c| c.key()).collect();
        warn!("⚠️ 未评分的评分项: {}", names.join(", "));
    }
    info!("{}", "─".repeat(60));
}
