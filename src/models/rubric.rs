//! 评分细则：固定的 8 个核心评分项与 2 个加分项

use serde::{Deserialize, Serialize};

/// 评分项
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionId {
    /// 覆盖度
    Coverage,
    /// 问题描述质量
    ViolationQuality,
    /// 截图与证据
    Screenshots,
    /// 严重程度分析
    SeverityAnalysis,
    /// 结构与导航
    StructureNavigation,
    /// 专业性
    ProfessionalQuality,
    /// 写作质量
    WritingQuality,
    /// 小组协作
    GroupIntegration,
    /// 加分：AI 机会
    BonusAiOpportunities,
    /// 加分：卓越质量
    BonusExceptionalQuality,
}

static CRITERION_KEYS: phf::Map<&'static str, CriterionId> = phf::phf_map! {
    "coverage" => CriterionId::Coverage,
    "violation_quality" => CriterionId::ViolationQuality,
    "screenshots" => CriterionId::Screenshots,
    "severity_analysis" => CriterionId::SeverityAnalysis,
    "structure_navigation" => CriterionId::StructureNavigation,
    "professional_quality" => CriterionId::ProfessionalQuality,
    "writing_quality" => CriterionId::WritingQuality,
    "group_integration" => CriterionId::GroupIntegration,
    "bonus_ai_opportunities" => CriterionId::BonusAiOpportunities,
    "bonus_exceptional_quality" => CriterionId::BonusExceptionalQuality,
};

impl CriterionId {
    /// 必评的核心评分项
    pub const CORE: [CriterionId; 8] = [
        CriterionId::Coverage,
        CriterionId::ViolationQuality,
        CriterionId::Screenshots,
        CriterionId::SeverityAnalysis,
        CriterionId::StructureNavigation,
        CriterionId::ProfessionalQuality,
        CriterionId::WritingQuality,
        CriterionId::GroupIntegration,
    ];

    /// 非必评的加分项
    pub const BONUS: [CriterionId; 2] = [
        CriterionId::BonusAiOpportunities,
        CriterionId::BonusExceptionalQuality,
    ];

    pub fn all() -> impl Iterator<Item = CriterionId> {
        Self::CORE.into_iter().chain(Self::BONUS)
    }

    /// 满分
    pub fn max_points(self) -> u32 {
        match self {
            CriterionId::Coverage => 15,
            CriterionId::ViolationQuality => 20,
            CriterionId::Screenshots => 10,
            CriterionId::SeverityAnalysis => 10,
            CriterionId::StructureNavigation => 10,
            CriterionId::ProfessionalQuality => 10,
            CriterionId::WritingQuality => 10,
            CriterionId::GroupIntegration => 15,
            CriterionId::BonusAiOpportunities => 3,
            CriterionId::BonusExceptionalQuality => 2,
        }
    }

    /// JSON 中使用的键名
    pub fn key(self) -> &'static str {
        match self {
            CriterionId::Coverage => "coverage",
            CriterionId::ViolationQuality => "violation_quality",
            CriterionId::Screenshots => "screenshots",
            CriterionId::SeverityAnalysis => "severity_analysis",
            CriterionId::StructureNavigation => "structure_navigation",
            CriterionId::ProfessionalQuality => "professional_quality",
            CriterionId::WritingQuality => "writing_quality",
            CriterionId::GroupIntegration => "group_integration",
            CriterionId::BonusAiOpportunities => "bonus_ai_opportunities",
            CriterionId::BonusExceptionalQuality => "bonus_exceptional_quality",
        }
    }

    pub fn is_bonus(self) -> bool {
        matches!(
            self,
            CriterionId::BonusAiOpportunities | CriterionId::BonusExceptionalQuality
        )
    }

    /// 从键名解析（大小写、空白不敏感）
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized = key.trim().to_ascii_lowercase();
        CRITERION_KEYS.get(normalized.as_str()).copied()
    }

    /// 核心评分项满分之和
    pub fn core_max_total() -> u32 {
        Self::CORE.iter().map(|c| c.max_points()).sum()
    }
}

impl std::fmt::Display for CriterionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}
