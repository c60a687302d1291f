use serde::{Deserialize, Serialize};

/// Nielsen 十大可用性原则
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Heuristic {
    VisibilityOfSystemStatus = 1,
    MatchSystemRealWorld = 2,
    UserControlFreedom = 3,
    ConsistencyStandards = 4,
    ErrorPrevention = 5,
    RecognitionRatherThanRecall = 6,
    FlexibilityEfficiency = 7,
    AestheticMinimalistDesign = 8,
    ErrorRecovery = 9,
    HelpDocumentation = 10,
}

/// 学生常用写法 → 原则编号（键为小写、去标点后的形式）
static HEURISTIC_ALIASES: phf::Map<&'static str, u8> = phf::phf_map! {
    "visibility of system status" => 1,
    "system status" => 1,
    "visibility" => 1,
    "match between system and the real world" => 2,
    "match between the system and the real world" => 2,
    "match between system and real world" => 2,
    "match system real world" => 2,
    "real world" => 2,
    "user control and freedom" => 3,
    "user control" => 3,
    "consistency and standards" => 4,
    "consistency" => 4,
    "error prevention" => 5,
    "recognition rather than recall" => 6,
    "recognition vs recall" => 6,
    "recognition versus recall" => 6,
    "recognition" => 6,
    "flexibility and efficiency of use" => 7,
    "flexibility and efficiency" => 7,
    "flexibility" => 7,
    "aesthetic and minimalist design" => 8,
    "aesthetic design" => 8,
    "minimalist design" => 8,
    "help users recognize diagnose and recover from errors" => 9,
    "recognize diagnose and recover from errors" => 9,
    "error recovery" => 9,
    "error messages" => 9,
    "help and documentation" => 10,
    "documentation" => 10,
};

impl Heuristic {
    pub const ALL: [Heuristic; 10] = [
        Heuristic::VisibilityOfSystemStatus,
        Heuristic::MatchSystemRealWorld,
        Heuristic::UserControlFreedom,
        Heuristic::ConsistencyStandards,
        Heuristic::ErrorPrevention,
        Heuristic::RecognitionRatherThanRecall,
        Heuristic::FlexibilityEfficiency,
        Heuristic::AestheticMinimalistDesign,
        Heuristic::ErrorRecovery,
        Heuristic::HelpDocumentation,
    ];

    /// 原则编号 (1-10)
    pub fn id(self) -> u8 {
        self as u8
    }

    /// 标准名称
    pub fn name(self) -> &'static str {
        match self {
            Heuristic::VisibilityOfSystemStatus => "Visibility of System Status",
            Heuristic::MatchSystemRealWorld => "Match Between System and the Real World",
            Heuristic::UserControlFreedom => "User Control and Freedom",
            Heuristic::ConsistencyStandards => "Consistency and Standards",
            Heuristic::ErrorPrevention => "Error Prevention",
            Heuristic::RecognitionRatherThanRecall => "Recognition Rather Than Recall",
            Heuristic::FlexibilityEfficiency => "Flexibility and Efficiency of Use",
            Heuristic::AestheticMinimalistDesign => "Aesthetic and Minimalist Design",
            Heuristic::ErrorRecovery => "Help Users Recognize, Diagnose, and Recover from Errors",
            Heuristic::HelpDocumentation => "Help and Documentation",
        }
    }

    /// 从编号解析
    pub fn from_id(id: i64) -> Option<Self> {
        if (1..=10).contains(&id) {
            Some(Self::ALL[(id - 1) as usize])
        } else {
            None
        }
    }

    /// 按名称查找（先精确匹配别名表，再按包含关系模糊匹配）
    pub fn find(name: &str) -> Option<Self> {
        let key = normalize_name(name);
        if key.is_empty() {
            return None;
        }

        if let Some(&id) = HEURISTIC_ALIASES.get(key.as_str()) {
            return Self::from_id(id as i64);
        }

        // 模糊匹配：最长的别名优先，避免 "error" 类的短词误判
        let mut best: Option<(usize, u8)> = None;
        for (alias, &id) in HEURISTIC_ALIASES.entries() {
            if key.contains(alias) && best.map_or(true, |(len, _)| alias.len() > len) {
                best = Some((alias.len(), id));
            }
        }
        best.and_then(|(_, id)| Self::from_id(id as i64))
    }

    /// 编号与名称综合判定：编号有效时以编号为准，否则回退到名称
    pub fn resolve(id: Option<i64>, name: &str) -> Option<Self> {
        id.and_then(Self::from_id).or_else(|| Self::find(name))
    }

    /// 提示词中的参考列表
    pub fn reference_list() -> String {
        Self::ALL
            .iter()
            .map(|h| format!("  {}. {}", h.id(), h.name()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Heuristic> for u8 {
    fn from(h: Heuristic) -> Self {
        h.id()
    }
}

impl TryFrom<u8> for Heuristic {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_id(value as i64).ok_or_else(|| format!("heuristic id {} out of range 1-10", value))
    }
}

impl std::fmt::Display for Heuristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "H{} {}", self.id(), self.name())
    }
}

fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_aliases() {
        assert_eq!(
            Heuristic::find("Visibility of System Status"),
            Some(Heuristic::VisibilityOfSystemStatus)
        );
        assert_eq!(Heuristic::find("Recognition vs. Recall"), Some(Heuristic::RecognitionRatherThanRecall));
        assert_eq!(
            Heuristic::find("Help Users Recognize, Diagnose, and Recover from Errors"),
            Some(Heuristic::ErrorRecovery)
        );
    }

    #[test]
    fn test_fuzzy_match_prefers_longest_alias() {
        // 同时包含 "error prevention" 与 "consistency"，最长别名胜出
        assert_eq!(
            Heuristic::find("H5 - Error Prevention (consistency)"),
            Some(Heuristic::ErrorPrevention)
        );
        assert_eq!(Heuristic::find("poor error messages here"), Some(Heuristic::ErrorRecovery));
        assert_eq!(Heuristic::find("something else"), None);
        assert_eq!(Heuristic::find(""), None);
    }

    #[test]
    fn test_resolve_prefers_valid_id() {
        assert_eq!(Heuristic::resolve(Some(4), "Error Prevention"), Some(Heuristic::ConsistencyStandards));
        assert_eq!(Heuristic::resolve(Some(11), "Error Prevention"), Some(Heuristic::ErrorPrevention));
        assert_eq!(Heuristic::resolve(None, "Documentation"), Some(Heuristic::HelpDocumentation));
        assert_eq!(Heuristic::resolve(Some(0), ""), None);
    }
}
