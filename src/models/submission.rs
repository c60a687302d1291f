//! 提交级别的评分结果与诊断信息

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::heuristic::Heuristic;
use crate::models::page::{PageRecord, Severity};
use crate::models::rubric::CriterionId;

/// 降级提取的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedKind {
    /// 严格解析失败，修复后得到部分数据
    Repaired,
    /// 完全无法解析
    Failed,
    /// 上游模型调用超时
    UpstreamTimeout,
    /// 上游模型调用出错
    UpstreamError,
}

/// 降级提取事件，附在结果上供人工查看
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedExtraction {
    pub page_index: u32,
    pub kind: DegradedKind,
    pub detail: String,
}

/// 聚合告警
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregationWarning {
    /// 没有任何页面给该评分项打分
    UnscoredCriterion { criterion: CriterionId },
}

/// 单个核心评分项的最终得分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AggregateScore {
    /// 所有已评分页面的最小值
    Scored {
        points: u32,
        max: u32,
        /// 取到最小值的页面（并列时取页码最小者）
        lowest_page: u32,
    },
    /// 没有页面评分，由全文统计推导（覆盖度）
    Derived { points: u32, max: u32 },
    /// 没有页面评分，既不是 0 也不是满分
    Unscored { max: u32 },
}

impl AggregateScore {
    pub fn points(&self) -> Option<u32> {
        match self {
            AggregateScore::Scored { points, .. } | AggregateScore::Derived { points, .. } => {
                Some(*points)
            }
            AggregateScore::Unscored { .. } => None,
        }
    }

    pub fn is_unscored(&self) -> bool {
        matches!(self, AggregateScore::Unscored { .. })
    }
}

/// 覆盖度统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageMetrics {
    /// 出现过的不同原则（未封顶）
    pub heuristics: Vec<Heuristic>,
    pub distinct_heuristics: usize,
    pub total_violations: usize,
    /// 按评分细则推导的覆盖度分数
    pub coverage_points: u32,
}

/// 导出用的问题明细
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEntry {
    pub page_index: u32,
    pub heuristic: Heuristic,
    pub heuristic_name: String,
    pub description: String,
    pub severity: Option<Severity>,
    /// 严重程度来自相邻页面时记录来源页
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_source: Option<u32>,
}

/// 提交级别评分结果
///
/// 只有在所有页面都处理完（评分或跳过）后才会生成。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub submission_id: String,
    pub pages: Vec<PageRecord>,
    pub criteria: BTreeMap<CriterionId, AggregateScore>,
    pub bonus: BTreeMap<CriterionId, u32>,
    pub coverage: CoverageMetrics,
    pub violations: Vec<ViolationEntry>,
    pub degraded: Vec<DegradedExtraction>,
    pub warnings: Vec<AggregationWarning>,
    pub overrides_applied: usize,
    /// 已评分（含推导）核心项 + 加分项
    pub total_points: u32,
    pub max_points: u32,
    /// 所有核心项都有分数
    pub complete: bool,
}

impl SubmissionResult {
    pub fn criterion(&self, criterion: CriterionId) -> Option<&AggregateScore> {
        self.criteria.get(&criterion)
    }

    pub fn page(&self, page_index: u32) -> Option<&PageRecord> {
        self.pages.iter().find(|p| p.page_index == page_index)
    }

    pub fn unscored_criteria(&self) -> Vec<CriterionId> {
        self.criteria
            .iter()
            .filter(|(_, score)| score.is_unscored())
            .map(|(criterion, _)| *criterion)
            .collect()
    }
}
