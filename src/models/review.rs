//! 人工复核记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_reviewer() -> String {
    "Anonymous".to_string()
}

/// 人工复核：把某页某评分项改为指定分数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub submission_id: String,
    pub page_index: u32,
    /// 评分项键名，应用前校验
    pub criterion: String,
    /// 新分数（有符号，便于拒绝负数输入）
    pub value: i64,
    #[serde(default)]
    pub reviewer_note: String,
    #[serde(default = "default_reviewer")]
    pub reviewer: String,
}

impl OverrideRecord {
    pub fn new(
        submission_id: impl Into<String>,
        page_index: u32,
        criterion: impl Into<String>,
        value: i64,
    ) -> Self {
        Self {
            submission_id: submission_id.into(),
            page_index,
            criterion: criterion.into(),
            value,
            reviewer_note: String::new(),
            reviewer: default_reviewer(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.reviewer_note = note.into();
        self
    }

    pub fn with_reviewer(mut self, reviewer: impl Into<String>) -> Self {
        self.reviewer = reviewer.into();
        self
    }
}

/// 追加式 override 日志中的一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedOverride {
    /// 提交内的应用顺序，从 1 开始
    pub sequence: u64,
    pub record: OverrideRecord,
    /// 改写前的分数（本页原本未评该项时为空）
    pub previous_value: Option<u32>,
    pub applied_at: DateTime<Utc>,
}

/// AI 评分错误报告：记录模型在哪一页、哪一项判断错了以及原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub submission_id: String,
    pub page_index: u32,
    /// 出错的部分：评分项键名，或 "feedback" / "violations" 等
    pub component: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_value: Option<String>,
    #[serde(default)]
    pub reviewer_notes: String,
}

impl CorrectionReport {
    pub fn new(
        submission_id: impl Into<String>,
        page_index: u32,
        component: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            submission_id: submission_id.into(),
            page_index,
            component: component.into(),
            reason: reason.into(),
            original_value: None,
            corrected_value: None,
            reviewer_notes: String::new(),
        }
    }

    pub fn with_values(mut self, original: impl Into<String>, corrected: impl Into<String>) -> Self {
        self.original_value = Some(original.into());
        self.corrected_value = Some(corrected.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.reviewer_notes = notes.into();
        self
    }
}

/// 纠错记录中的一条（追加式，不修改分数）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    /// 提交内的记录顺序，从 1 开始
    pub sequence: u64,
    #[serde(flatten)]
    pub report: CorrectionReport,
    pub reported_at: DateTime<Utc>,
}

/// 自动生成的备注前缀，不算人工标记
const AUTO_NOTE_MARKERS: [&str; 2] = ["auto-set:", "auto-generated"];

/// 人工风险标记：提醒复核人员重点查看某页
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFlag {
    pub page_index: u32,
    #[serde(default)]
    pub notes: String,
    pub flagged_at: DateTime<Utc>,
}

impl RiskFlag {
    pub fn is_auto_generated(&self) -> bool {
        let lowered = self.notes.to_ascii_lowercase();
        AUTO_NOTE_MARKERS.iter().any(|marker| lowered.contains(marker))
    }
}

/// 切换风险标记的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlagToggle {
    Added,
    Removed,
}

/// 复核文件中的一次风险标记切换
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedPage {
    pub page_index: u32,
    #[serde(default)]
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_generated_notes_are_detected() {
        let flag = |notes: &str| RiskFlag {
            page_index: 1,
            notes: notes.to_string(),
            flagged_at: Utc::now(),
        };
        assert!(flag("Auto-set: low confidence").is_auto_generated());
        assert!(flag("auto-generated by extraction").is_auto_generated());
        assert!(!flag("screenshot does not match description").is_auto_generated());
        assert!(!flag("").is_auto_generated());
    }

    #[test]
    fn test_correction_serializes_flat() {
        let correction = Correction {
            sequence: 1,
            report: CorrectionReport::new("g1", 3, "violation_quality", "missed a violation")
                .with_values("20", "17"),
            reported_at: Utc::now(),
        };
        let value = serde_json::to_value(&correction).unwrap();
        assert_eq!(value["submission_id"], "g1");
        assert_eq!(value["corrected_value"], "17");
        assert_eq!(value["sequence"], 1);
    }
}
