//! 批量提交处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量提交的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：日志文件、LLM 服务、评分引擎
//! 2. **批量加载**：扫描并加载所有提交清单（`Vec<SubmissionInput>`）
//! 3. **逐个评分**：委托 `GradingEngine`，页面级并发由引擎控制
//! 4. **复核回放**：清单旁的 `<stem>.overrides.toml` 在评分后依次应用（改分、纠错记录、风险标记）
//! 5. **全局统计**：汇总所有提交的处理结果

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::{load_all_submissions, load_review_file, SubmissionInput};
use crate::orchestrator::engine::GradingEngine;
use crate::services::{LlmService, ResultWriter};
use crate::utils::logging::{init_log_file, log_startup, log_submissions_loaded, print_final_stats};

/// 应用主结构
pub struct App {
    config: Config,
    engine: GradingEngine,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        init_log_file(&config.output_log_file)?;

        let llm_service = LlmService::new(&config);
        let engine = GradingEngine::new(Arc::new(llm_service), &config)
            .context("评分引擎初始化失败")?
            .with_writer(ResultWriter::new(&config.output_dir));

        log_startup(&config, engine.prompt());

        Ok(Self { config, engine })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        info!("\n📁 正在扫描待评分的提交...");
        let submissions = load_all_submissions(&self.config.input_folder).await?;

        if submissions.is_empty() {
            warn!("⚠️ 没有找到待处理的TOML文件，程序结束");
            return Ok(());
        }

        log_submissions_loaded(submissions.len(), self.config.max_concurrent_pages);

        let mut stats = ProcessingStats {
            total: submissions.len(),
            ..Default::default()
        };

        for (index, (manifest_path, input)) in submissions.into_iter().enumerate() {
            info!("\n📦 提交 {}/{}: {}", index + 1, stats.total, input.submission_id);
            match self.process_one(&manifest_path, input).await {
                Ok(outcome) => {
                    stats.success += 1;
                    stats.degraded_pages += outcome.degraded_pages;
                    stats.overrides_applied += outcome.overrides_applied;
                    stats.overrides_rejected += outcome.overrides_rejected;
                    stats.overrides_failed += outcome.overrides_failed;
                }
                Err(e) => {
                    error!("❌ {} 处理失败: {:#}", manifest_path.display(), e);
                    stats.failed += 1;
                }
            }
        }

        print_final_stats(
            stats.success,
            stats.failed,
            stats.total,
            stats.degraded_pages,
            stats.overrides_applied,
            stats.overrides_rejected,
            stats.overrides_failed,
            &self.config.output_log_file,
        );

        Ok(())
    }

    /// 评分一个提交并回放复核文件
    async fn process_one(&self, manifest_path: &Path, input: SubmissionInput) -> Result<SubmissionOutcome> {
        let submission_id = input.submission_id.clone();
        let result = self
            .engine
            .grade_submission(input)
            .await
            .with_context(|| format!("评分失败: {}", submission_id))?;

        let mut outcome = SubmissionOutcome {
            degraded_pages: result.degraded.len(),
            ..Default::default()
        };

        let review = load_review_file(manifest_path, &submission_id).await?;
        if !review.is_empty() {
            info!(
                "[提交 {}] ✏️ 回放复核: {} 条改分 / {} 条纠错 / {} 个风险标记",
                submission_id,
                review.overrides.len(),
                review.corrections.len(),
                review.risk_flags.len()
            );
        }
        for record in review.overrides {
            match self.engine.apply_override(record).await {
                Ok(_) => outcome.overrides_applied += 1,
                // 校验失败已由引擎记录，不影响其他复核
                Err(e) if e.is_rejection() => outcome.overrides_rejected += 1,
                Err(e) => {
                    error!("[提交 {}] ❌ override 应用失败: {}", submission_id, e);
                    outcome.overrides_failed += 1;
                }
            }
        }
        for report in review.corrections {
            if let Err(e) = self.engine.report_correction(report).await {
                if !e.is_rejection() {
                    error!("[提交 {}] ❌ 纠错记录写入失败: {}", submission_id, e);
                }
            }
        }
        for flag in review.risk_flags {
            if let Err(e) = self
                .engine
                .toggle_risk_flag(&submission_id, flag.page_index, &flag.notes)
                .await
            {
                warn!("[提交 {}] ⚠️ 风险标记无效: {}", submission_id, e);
            }
        }

        Ok(outcome)
    }
}

/// 处理统计
#[derive(Debug, Default)]
struct ProcessingStats {
    success: usize,
    failed: usize,
    total: usize,
    degraded_pages: usize,
    overrides_applied: usize,
    overrides_rejected: usize,
    overrides_failed: usize,
}

/// 单个提交的处理结果
#[derive(Debug, Default)]
struct SubmissionOutcome {
    degraded_pages: usize,
    overrides_applied: usize,
    overrides_rejected: usize,
    overrides_failed: usize,
}
