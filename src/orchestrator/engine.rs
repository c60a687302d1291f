//! 评分引擎 - 编排层对外接口
//!
//! ## 对外操作
//!
//! - `grade_submission`：并发评分全部页面并聚合
//! - `finalize`：重新聚合（幂等）
//! - `apply_override`：校验、记录并应用人工复核，返回重新聚合的结果
//! - `report_correction` / `corrections`：记录并查询 AI 评分错误（不改分数）
//! - `toggle_risk_flag` / `risk_flags`：人工风险标记
//! - `result` / `override_log`：只读查询
//!
//! 同一提交的 override 通过该提交的锁串行执行；不同提交互不影响。

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppResult, ValidationError};
use crate::infrastructure::{SubmissionState, SubmissionStore};
use crate::models::input::SubmissionInput;
use crate::models::prompt::PromptVersion;
use crate::models::review::{
    AppliedOverride, Correction, CorrectionReport, OverrideRecord, RiskFlag, RiskFlagToggle,
};
use crate::models::submission::SubmissionResult;
use crate::orchestrator::submission_processor::process_submission;
use crate::services::extraction::Extractor;
use crate::services::llm_service::ScoringModel;
use crate::services::ResultWriter;
use crate::workflow::PageFlow;

/// 评分引擎
pub struct GradingEngine {
    store: SubmissionStore,
    flow: Arc<PageFlow>,
    prompt: Arc<PromptVersion>,
    max_concurrent_pages: usize,
    writer: Option<ResultWriter>,
}

impl GradingEngine {
    /// 创建引擎；提示词按配置加载（未配置时使用内置版本）
    pub fn new(model: Arc<dyn ScoringModel>, config: &Config) -> AppResult<Self> {
        let prompt = PromptVersion::load_or_default(config.prompt_file.as_deref())?;
        let flow = PageFlow::new(model, Extractor::new()?, config);

        Ok(Self {
            store: SubmissionStore::new(),
            flow: Arc::new(flow),
            prompt: Arc::new(prompt),
            max_concurrent_pages: config.max_concurrent_pages,
            writer: None,
        })
    }

    /// 指定默认提示词版本
    pub fn with_prompt(mut self, prompt: PromptVersion) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    /// 启用结果落盘
    pub fn with_writer(mut self, writer: ResultWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn prompt(&self) -> &PromptVersion {
        &self.prompt
    }

    /// 用默认提示词评分一个提交
    pub async fn grade_submission(&self, input: SubmissionInput) -> AppResult<SubmissionResult> {
        self.grade_submission_with(input, Arc::clone(&self.prompt)).await
    }

    /// 用指定提示词版本评分一个提交
    pub async fn grade_submission_with(
        &self,
        input: SubmissionInput,
        prompt: Arc<PromptVersion>,
    ) -> AppResult<SubmissionResult> {
        let state = self.store.register(&input).await?;
        process_submission(
            Arc::clone(&self.flow),
            prompt,
            &input,
            state,
            self.max_concurrent_pages,
            self.writer.as_ref(),
        )
        .await
    }

    /// 重新聚合；没有新 override 时结果不变
    pub async fn finalize(&self, submission_id: &str) -> AppResult<SubmissionResult> {
        let state = self.state(submission_id).await?;
        let mut guard = state.lock().await;
        Ok(guard.finalize()?)
    }

    /// 应用一条人工复核
    ///
    /// 校验失败时状态不变；日志先落盘再修改内存状态。
    pub async fn apply_override(&self, record: OverrideRecord) -> AppResult<SubmissionResult> {
        let state = self.state(&record.submission_id).await?;
        let mut guard = state.lock().await;

        let pending = match guard.prepare_override(record) {
            Ok(pending) => pending,
            Err(e) => {
                warn!("[提交 {}] ❌ override 被拒绝: {}", guard.submission_id(), e);
                return Err(e);
            }
        };

        if let Some(writer) = &self.writer {
            writer.append_override(&pending.entry).await?;
        }

        let entry = pending.entry.clone();
        let result = guard.commit_override(pending);
        info!(
            "[提交 {}] ✏️ override #{}: 第 {} 页 {} {:?} → {} ({})",
            result.submission_id,
            entry.sequence,
            entry.record.page_index,
            entry.record.criterion,
            entry.previous_value,
            entry.record.value,
            entry.record.reviewer
        );

        // override 已生效，结果文件写入失败只记录
        if let Some(writer) = &self.writer {
            if let Err(e) = writer.write_result(&result).await {
                warn!("[提交 {}] ⚠️ 结果文件写入失败: {}", result.submission_id, e);
            }
        }
        Ok(result)
    }

    /// 记录一条 AI 评分错误报告
    pub async fn report_correction(&self, report: CorrectionReport) -> AppResult<Correction> {
        let state = self.state(&report.submission_id).await?;
        let mut guard = state.lock().await;

        let correction = match guard.prepare_correction(report) {
            Ok(correction) => correction,
            Err(e) => {
                warn!("[提交 {}] ❌ 纠错记录被拒绝: {}", guard.submission_id(), e);
                return Err(e.into());
            }
        };

        if let Some(writer) = &self.writer {
            writer.append_correction(&correction).await?;
        }
        guard.commit_correction(correction.clone());

        info!(
            "[提交 {}] 📝 纠错 #{}: 第 {} 页 {} - {}",
            correction.report.submission_id,
            correction.sequence,
            correction.report.page_index,
            correction.report.component,
            correction.report.reason
        );
        Ok(correction)
    }

    /// 纠错记录；指定提交时只返回该提交的记录
    pub async fn corrections(&self, submission_id: Option<&str>) -> Vec<Correction> {
        let ids = match submission_id {
            Some(id) => vec![id.to_string()],
            None => self.store.submission_ids().await,
        };

        let mut corrections = Vec::new();
        for id in ids {
            if let Some(state) = self.store.get(&id).await {
                let guard = state.lock().await;
                corrections.extend_from_slice(guard.corrections());
            }
        }
        corrections.sort_by(|a, b| a.reported_at.cmp(&b.reported_at));
        corrections
    }

    /// 切换某页的人工风险标记
    pub async fn toggle_risk_flag(
        &self,
        submission_id: &str,
        page_index: u32,
        notes: &str,
    ) -> AppResult<RiskFlagToggle> {
        let state = self.state(submission_id).await?;
        let mut guard = state.lock().await;

        let toggle = guard.toggle_risk_flag(page_index, notes)?;
        info!("[提交 {}] 🚩 第 {} 页风险标记: {:?}", submission_id, page_index, toggle);

        if let Some(writer) = &self.writer {
            if let Err(e) = writer.write_risk_flags(submission_id, &guard.risk_flags()).await {
                warn!("[提交 {}] ⚠️ 风险标记写入失败: {}", submission_id, e);
            }
        }
        Ok(toggle)
    }

    pub async fn risk_flags(&self, submission_id: &str) -> Vec<RiskFlag> {
        let Some(state) = self.store.get(submission_id).await else {
            return Vec::new();
        };
        let guard = state.lock().await;
        guard.risk_flags()
    }

    /// 最近一次聚合结果；尚未完成时为 `None`
    pub async fn result(&self, submission_id: &str) -> Option<SubmissionResult> {
        let state = self.store.get(submission_id).await?;
        let guard = state.lock().await;
        guard.result().cloned()
    }

    /// 某提交的 override 日志（按应用顺序）
    pub async fn override_log(&self, submission_id: &str) -> Vec<AppliedOverride> {
        let Some(state) = self.store.get(submission_id).await else {
            return Vec::new();
        };
        let guard = state.lock().await;
        guard.override_log().to_vec()
    }

    pub async fn submission_ids(&self) -> Vec<String> {
        self.store.submission_ids().await
    }

    async fn state(
        &self,
        submission_id: &str,
    ) -> AppResult<Arc<tokio::sync::Mutex<SubmissionState>>> {
        self.store.get(submission_id).await.ok_or_else(|| {
            ValidationError::UnknownSubmission {
                submission_id: submission_id.to_string(),
            }
            .into()
        })
    }
}
