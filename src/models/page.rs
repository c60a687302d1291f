//! 单页评分记录

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::heuristic::Heuristic;
use crate::models::rubric::CriterionId;

/// 问题严重程度（Nielsen 1-4 级）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Cosmetic = 1,
    Minor = 2,
    Major = 3,
    Critical = 4,
}

impl Severity {
    pub fn level(self) -> u8 {
        self as u8
    }

    /// 解析学生写法：文字（Minor / High ...）或数字（"3"、"Severity: 3"、"3/4"）
    ///
    /// 无法识别时返回 `None`；空字符串由调用方按"未说明"处理。
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        if lowered.is_empty() {
            return None;
        }

        for word in lowered.split(|c: char| !c.is_ascii_alphanumeric()) {
            let found = match word {
                "cosmetic" => Some(Severity::Cosmetic),
                "minor" | "low" => Some(Severity::Minor),
                "major" | "medium" | "moderate" => Some(Severity::Major),
                "critical" | "high" | "catastrophe" | "catastrophic" | "severe" => {
                    Some(Severity::Critical)
                }
                _ => None,
            };
            if found.is_some() {
                return found;
            }
        }

        // 数字等级：取第一个完整整数（"3/4" 取 3，"10" 无效）
        lowered
            .split(|c: char| !c.is_ascii_digit())
            .find(|token| !token.is_empty())
            .and_then(|token| token.parse::<u8>().ok())
            .and_then(|level| match level {
                1 => Some(Severity::Cosmetic),
                2 => Some(Severity::Minor),
                3 => Some(Severity::Major),
                4 => Some(Severity::Critical),
                _ => None,
            })
    }
}

/// 单条可用性问题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub heuristic: Heuristic,
    /// 规范化后的原则名称
    pub heuristic_name: String,
    pub description: String,
    /// `None` 表示本页未写明严重程度
    pub severity: Option<Severity>,
}

/// 单个评分项在某页上的得分
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageScore {
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// 是否被人工复核改写过
    #[serde(default)]
    pub overridden: bool,
}

/// 页面分类
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageClassification {
    /// 参与评分的内容页
    Content,
    /// 跳过的页面（标题页、空白页、解析失败等）
    Skip { reason: String },
}

/// 产出该记录的提取策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Strict,
    Repair,
    Failed,
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExtractionMethod::Strict => "strict",
            ExtractionMethod::Repair => "repair",
            ExtractionMethod::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// 单页评分记录
///
/// 提取时创建一次；之后只有人工复核会改写其中的分数。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_index: u32,
    pub classification: PageClassification,
    /// 模型给出的页面类型描述
    pub page_type: String,
    pub violations: Vec<Violation>,
    pub scores: BTreeMap<CriterionId, PageScore>,
    pub feedback: String,
    pub extraction: ExtractionMethod,
}

impl PageRecord {
    /// 跳过页：不含任何分数与问题
    pub fn skipped(page_index: u32, reason: impl Into<String>, extraction: ExtractionMethod) -> Self {
        Self {
            page_index,
            classification: PageClassification::Skip {
                reason: reason.into(),
            },
            page_type: String::new(),
            violations: Vec::new(),
            scores: BTreeMap::new(),
            feedback: String::new(),
            extraction,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.classification, PageClassification::Skip { .. })
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match &self.classification {
            PageClassification::Skip { reason } => Some(reason),
            PageClassification::Content => None,
        }
    }

    /// 某评分项在本页的得分（跳过页永远没有）
    pub fn score(&self, criterion: CriterionId) -> Option<u32> {
        if self.is_skipped() {
            return None;
        }
        self.scores.get(&criterion).map(|s| s.points)
    }
}
