//! 提交状态存储 - 基础设施层
//!
//! 持有每个提交的可变状态，每个提交一把锁，提交之间没有共享的可变状态。
//! 页面记录、override 日志和最终结果都只能在持锁时修改。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::error::{AppResult, SubmissionError, ValidationError};
use crate::models::input::SubmissionInput;
use crate::models::page::{PageRecord, PageScore};
use crate::models::review::{
    AppliedOverride, Correction, CorrectionReport, OverrideRecord, RiskFlag, RiskFlagToggle,
};
use crate::models::rubric::CriterionId;
use crate::models::submission::{DegradedExtraction, SubmissionResult};
use crate::services::aggregation::aggregate;

/// 单个提交的状态
#[derive(Debug)]
pub struct SubmissionState {
    submission_id: String,
    expected: BTreeSet<u32>,
    pages: BTreeMap<u32, PageRecord>,
    degraded: Vec<DegradedExtraction>,
    overrides: Vec<AppliedOverride>,
    corrections: Vec<Correction>,
    risk_flags: BTreeMap<u32, RiskFlag>,
    /// 最近一次聚合结果；只有全部页面处理完后才会存在
    result: Option<SubmissionResult>,
}

/// 通过校验、尚未写入的 override
#[derive(Debug, Clone)]
pub struct PendingOverride {
    pub criterion: CriterionId,
    pub entry: AppliedOverride,
}

impl SubmissionState {
    fn new(input: &SubmissionInput) -> Self {
        Self {
            submission_id: input.submission_id.clone(),
            expected: input.page_indices().into_iter().collect(),
            pages: BTreeMap::new(),
            degraded: Vec::new(),
            overrides: Vec::new(),
            corrections: Vec::new(),
            risk_flags: BTreeMap::new(),
            result: None,
        }
    }

    pub fn submission_id(&self) -> &str {
        &self.submission_id
    }

    pub fn processed(&self) -> usize {
        self.pages.len()
    }

    pub fn expected(&self) -> usize {
        self.expected.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.result.is_some()
    }

    pub fn result(&self) -> Option<&SubmissionResult> {
        self.result.as_ref()
    }

    pub fn override_log(&self) -> &[AppliedOverride] {
        &self.overrides
    }

    pub fn corrections(&self) -> &[Correction] {
        &self.corrections
    }

    /// 人工风险标记（按页码排序，不含自动生成的标记）
    pub fn risk_flags(&self) -> Vec<RiskFlag> {
        self.risk_flags
            .values()
            .filter(|flag| !flag.is_auto_generated())
            .cloned()
            .collect()
    }

    /// 记录一页的处理结果（评分或跳过）
    pub fn record_page(
        &mut self,
        record: PageRecord,
        degraded: Option<DegradedExtraction>,
    ) -> Result<(), SubmissionError> {
        let page_index = record.page_index;
        if !self.expected.contains(&page_index) {
            return Err(SubmissionError::UnexpectedPage {
                submission_id: self.submission_id.clone(),
                page_index,
            });
        }
        if self.pages.contains_key(&page_index) {
            return Err(SubmissionError::DuplicatePage {
                submission_id: self.submission_id.clone(),
                page_index,
            });
        }

        self.pages.insert(page_index, record);
        self.degraded.extend(degraded);
        Ok(())
    }

    /// 全部页面处理完后聚合
    ///
    /// 幂等：没有新 override 时重复调用得到相同结果。
    pub fn finalize(&mut self) -> Result<SubmissionResult, SubmissionError> {
        if self.pages.len() < self.expected.len() {
            return Err(SubmissionError::NotReady {
                submission_id: self.submission_id.clone(),
                processed: self.pages.len(),
                expected: self.expected.len(),
            });
        }
        Ok(self.reaggregate())
    }

    fn reaggregate(&mut self) -> SubmissionResult {
        let pages: Vec<PageRecord> = self.pages.values().cloned().collect();
        let result = aggregate(&self.submission_id, &pages, &self.degraded, self.overrides.len());
        self.result = Some(result.clone());
        result
    }

    /// 校验 override，不修改任何状态
    pub fn prepare_override(&self, record: OverrideRecord) -> AppResult<PendingOverride> {
        if !self.is_finalized() {
            return Err(SubmissionError::NotReady {
                submission_id: self.submission_id.clone(),
                processed: self.pages.len(),
                expected: self.expected.len(),
            }
            .into());
        }

        let page = self
            .pages
            .get(&record.page_index)
            .ok_or_else(|| ValidationError::UnknownPage {
                submission_id: self.submission_id.clone(),
                page_index: record.page_index,
            })?;
        let criterion = CriterionId::from_key(&record.criterion).ok_or_else(|| {
            ValidationError::UnknownCriterion {
                criterion: record.criterion.clone(),
            }
        })?;
        if let Some(reason) = page.skip_reason() {
            return Err(ValidationError::SkippedPage {
                page_index: record.page_index,
                reason: reason.to_string(),
            }
            .into());
        }
        let max = criterion.max_points();
        if !(0..=i64::from(max)).contains(&record.value) {
            return Err(ValidationError::ValueOutOfRange {
                criterion: criterion.key().to_string(),
                value: record.value,
                max,
            }
            .into());
        }

        let entry = AppliedOverride {
            sequence: self.overrides.len() as u64 + 1,
            previous_value: page.score(criterion),
            record,
            applied_at: Utc::now(),
        };
        Ok(PendingOverride { criterion, entry })
    }

    /// 应用已校验的 override，然后整体重新聚合
    pub fn commit_override(&mut self, pending: PendingOverride) -> SubmissionResult {
        let PendingOverride { criterion, entry } = pending;

        if let Some(page) = self.pages.get_mut(&entry.record.page_index) {
            // 已在 prepare_override 中校验过范围
            let points = entry.record.value.clamp(0, i64::from(criterion.max_points())) as u32;
            page.scores
                .entry(criterion)
                .and_modify(|score| {
                    score.points = points;
                    score.overridden = true;
                })
                .or_insert(PageScore {
                    points,
                    comment: None,
                    overridden: true,
                });
        }
        self.overrides.push(entry);
        self.reaggregate()
    }

    /// 校验 AI 错误报告，不修改任何状态
    ///
    /// 纠错记录只用于改进提示词，不改变分数，因此不要求提交已完成。
    pub fn prepare_correction(&self, report: CorrectionReport) -> Result<Correction, ValidationError> {
        self.ensure_page(report.page_index)?;
        for (field, value) in [("component", &report.component), ("reason", &report.reason)] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    field: field.to_string(),
                });
            }
        }

        Ok(Correction {
            sequence: self.corrections.len() as u64 + 1,
            report,
            reported_at: Utc::now(),
        })
    }

    pub fn commit_correction(&mut self, correction: Correction) {
        self.corrections.push(correction);
    }

    /// 切换某页的人工风险标记：已标记则取消，否则添加
    pub fn toggle_risk_flag(
        &mut self,
        page_index: u32,
        notes: &str,
    ) -> Result<RiskFlagToggle, ValidationError> {
        self.ensure_page(page_index)?;
        if self.risk_flags.remove(&page_index).is_some() {
            return Ok(RiskFlagToggle::Removed);
        }
        self.risk_flags.insert(
            page_index,
            RiskFlag {
                page_index,
                notes: notes.trim().to_string(),
                flagged_at: Utc::now(),
            },
        );
        Ok(RiskFlagToggle::Added)
    }

    fn ensure_page(&self, page_index: u32) -> Result<(), ValidationError> {
        if self.expected.contains(&page_index) {
            Ok(())
        } else {
            Err(ValidationError::UnknownPage {
                submission_id: self.submission_id.clone(),
                page_index,
            })
        }
    }
}

/// 所有提交的状态
#[derive(Debug, Default)]
pub struct SubmissionStore {
    submissions: RwLock<HashMap<String, Arc<Mutex<SubmissionState>>>>,
}

impl SubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个新提交
    pub async fn register(
        &self,
        input: &SubmissionInput,
    ) -> Result<Arc<Mutex<SubmissionState>>, SubmissionError> {
        input.validate()?;

        let mut submissions = self.submissions.write().await;
        if submissions.contains_key(&input.submission_id) {
            return Err(SubmissionError::AlreadyRegistered {
                submission_id: input.submission_id.clone(),
            });
        }
        let state = Arc::new(Mutex::new(SubmissionState::new(input)));
        submissions.insert(input.submission_id.clone(), Arc::clone(&state));
        Ok(state)
    }

    /// 取得某个提交的状态句柄
    pub async fn get(&self, submission_id: &str) -> Option<Arc<Mutex<SubmissionState>>> {
        self.submissions.read().await.get(submission_id).cloned()
    }

    pub async fn submission_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.submissions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::input::PageInput;
    use crate::models::page::{ExtractionMethod, PageClassification};

    fn input() -> SubmissionInput {
        SubmissionInput::new(
            "g1",
            vec![PageInput::new(1, "cover"), PageInput::new(2, "analysis")],
        )
    }

    fn content(index: u32, criterion: CriterionId, points: u32) -> PageRecord {
        let mut record = PageRecord::skipped(index, "", ExtractionMethod::Strict);
        record.classification = PageClassification::Content;
        record.scores.insert(
            criterion,
            PageScore {
                points,
                comment: Some("ok".to_string()),
                overridden: false,
            },
        );
        record
    }

    async fn finalized_state() -> Arc<Mutex<SubmissionState>> {
        let store = SubmissionStore::new();
        let state = store.register(&input()).await.unwrap();
        {
            let mut guard = state.lock().await;
            guard
                .record_page(PageRecord::skipped(1, "cover page", ExtractionMethod::Strict), None)
                .unwrap();
            guard
                .record_page(content(2, CriterionId::Screenshots, 9), None)
                .unwrap();
            guard.finalize().unwrap();
        }
        state
    }

    #[tokio::test]
    async fn test_finalize_waits_for_every_page() {
        let store = SubmissionStore::new();
        let state = store.register(&input()).await.unwrap();
        let mut guard = state.lock().await;

        guard
            .record_page(content(2, CriterionId::Screenshots, 9), None)
            .unwrap();
        assert!(matches!(
            guard.finalize(),
            Err(SubmissionError::NotReady {
                processed: 1,
                expected: 2,
                ..
            })
        ));
        assert!(guard.result().is_none());

        guard
            .record_page(PageRecord::skipped(1, "cover page", ExtractionMethod::Strict), None)
            .unwrap();
        let first = guard.finalize().unwrap();
        let second = guard.finalize().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_page_bookkeeping_errors() {
        let store = SubmissionStore::new();
        let state = store.register(&input()).await.unwrap();
        assert!(matches!(
            store.register(&input()).await,
            Err(SubmissionError::AlreadyRegistered { .. })
        ));

        let mut guard = state.lock().await;
        assert!(matches!(
            guard.record_page(content(9, CriterionId::Screenshots, 1), None),
            Err(SubmissionError::UnexpectedPage { page_index: 9, .. })
        ));
        guard
            .record_page(content(2, CriterionId::Screenshots, 1), None)
            .unwrap();
        assert!(matches!(
            guard.record_page(content(2, CriterionId::Screenshots, 1), None),
            Err(SubmissionError::DuplicatePage { page_index: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_overrides_leave_state_unchanged() {
        let state = finalized_state().await;
        let mut guard = state.lock().await;
        let before = guard.result().cloned();

        let rejected = [
            OverrideRecord::new("g1", 7, "screenshots", 5),
            OverrideRecord::new("g1", 2, "originality", 5),
            OverrideRecord::new("g1", 1, "screenshots", 5),
            OverrideRecord::new("g1", 2, "screenshots", 11),
            OverrideRecord::new("g1", 2, "screenshots", -1),
        ];
        for record in rejected {
            assert!(matches!(
                guard.prepare_override(record),
                Err(AppError::Validation(_))
            ));
        }

        assert!(guard.override_log().is_empty());
        assert_eq!(guard.result().cloned(), before);
        let _ = guard.finalize().unwrap();
    }

    #[tokio::test]
    async fn test_override_replaces_score_and_reaggregates() {
        let state = finalized_state().await;
        let mut guard = state.lock().await;

        let pending = guard
            .prepare_override(OverrideRecord::new("g1", 2, "screenshots", 4).with_note("blurry"))
            .unwrap();
        assert_eq!(pending.entry.previous_value, Some(9));
        assert_eq!(pending.entry.sequence, 1);
        let result = guard.commit_override(pending);

        let score = &result.page(2).unwrap().scores[&CriterionId::Screenshots];
        assert_eq!(score.points, 4);
        assert!(score.overridden);
        assert_eq!(score.comment.as_deref(), Some("ok"));
        assert_eq!(
            result.criterion(CriterionId::Screenshots).and_then(|s| s.points()),
            Some(4)
        );
        assert_eq!(result.overrides_applied, 1);
        assert_eq!(guard.override_log().len(), 1);
    }

    #[tokio::test]
    async fn test_override_can_score_unscored_criterion() {
        let state = finalized_state().await;
        let mut guard = state.lock().await;
        assert!(guard.result().unwrap().criterion(CriterionId::GroupIntegration).unwrap().is_unscored());

        let pending = guard
            .prepare_override(OverrideRecord::new("g1", 2, "group_integration", 12))
            .unwrap();
        assert_eq!(pending.entry.previous_value, None);
        let result = guard.commit_override(pending);
        assert_eq!(
            result.criterion(CriterionId::GroupIntegration).and_then(|s| s.points()),
            Some(12)
        );
    }

    #[tokio::test]
    async fn test_corrections_append_without_touching_scores() {
        let state = finalized_state().await;
        let mut guard = state.lock().await;
        let before = guard.result().cloned();

        for reason in ["missed a violation", "severity misread"] {
            let correction = guard
                .prepare_correction(CorrectionReport::new("g1", 2, "violation_quality", reason))
                .unwrap();
            guard.commit_correction(correction);
        }

        let sequences: Vec<_> = guard.corrections().iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(guard.corrections()[1].report.reason, "severity misread");
        assert_eq!(guard.result().cloned(), before);
    }

    #[tokio::test]
    async fn test_invalid_correction_is_rejected() {
        let state = finalized_state().await;
        let guard = state.lock().await;

        assert!(matches!(
            guard.prepare_correction(CorrectionReport::new("g1", 9, "feedback", "wrong")),
            Err(ValidationError::UnknownPage { page_index: 9, .. })
        ));
        assert_eq!(
            guard
                .prepare_correction(CorrectionReport::new("g1", 2, "feedback", "  "))
                .unwrap_err(),
            ValidationError::MissingField {
                field: "reason".to_string()
            }
        );
        assert!(guard.corrections().is_empty());
    }

    #[tokio::test]
    async fn test_risk_flag_toggles() {
        let store = SubmissionStore::new();
        let state = store.register(&input()).await.unwrap();
        let mut guard = state.lock().await;

        assert_eq!(guard.toggle_risk_flag(2, "check screenshots").unwrap(), RiskFlagToggle::Added);
        assert_eq!(guard.toggle_risk_flag(1, "Auto-set: cover").unwrap(), RiskFlagToggle::Added);
        let flags = guard.risk_flags();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].page_index, 2);
        assert_eq!(flags[0].notes, "check screenshots");

        assert_eq!(guard.toggle_risk_flag(2, "").unwrap(), RiskFlagToggle::Removed);
        assert!(guard.risk_flags().is_empty());
        assert!(guard.toggle_risk_flag(5, "").is_err());
    }

    #[test]
    fn test_submission_ids_are_sorted() {
        tokio_test::block_on(async {
            let store = SubmissionStore::new();
            for id in ["g3", "g1", "g2"] {
                let input = SubmissionInput::new(id, vec![PageInput::new(1, "page")]);
                tokio_test::assert_ok!(store.register(&input).await);
            }
            assert_eq!(store.submission_ids().await, vec!["g1", "g2", "g3"]);
            assert!(store.get("g4").await.is_none());
        });
    }

    #[tokio::test]
    async fn test_override_before_finalize_is_rejected() {
        let store = SubmissionStore::new();
        let state = store.register(&input()).await.unwrap();
        let guard = state.lock().await;
        assert!(matches!(
            guard.prepare_override(OverrideRecord::new("g1", 2, "screenshots", 4)),
            Err(AppError::Submission(SubmissionError::NotReady { .. }))
        ));
    }
}
