//! 带版本号的评分提示词
//!
//! 每次评分请求都显式携带一个 `PromptVersion`，不存在进程内的"当前提示词"全局状态。
//! 哪个版本处于启用状态由外部配置（`prompt_file`）决定。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, FileError};
use crate::models::heuristic::Heuristic;
use crate::models::input::PageInput;

/// 送入模型的页面文本上限（字符）
const PAGE_CONTENT_LIMIT: usize = 2500;

pub const SYSTEM_PROMPT: &str = "You are an expert grading assistant for UX/HCI heuristic evaluation \
assignments. You grade one page at a time and always answer with a single JSON object.";

const DEFAULT_TEMPLATE: &str = r#"You are evaluating one page of a student's heuristic evaluation assignment.

NIELSEN HEURISTICS REFERENCE:
{heuristics}

STUDENT SUBMISSION - PAGE {page_number}:
Content: {word_count} words, Has image: {has_image}
{page_content}

=== STEP 1: CLASSIFICATION ===
Set skip_analysis to true (with a short skip_reason) for cover pages, table of contents,
blank pages and pages that contain only a heuristic title such as "Heuristic 3".
Analyze introduction pages, heuristic violation analysis pages, severity summary pages
and conclusion pages.

=== STEP 2: EXTRACTION ===
Only for page_type "heuristic violation analysis": list every violation the student
describes on THIS page with heuristic_num (1-10), heuristic_name (as written or the
closest standard name), description (max 30 words) and severity exactly as written
("Cosmetic", "Minor", "Major", "Critical" or 1-4). Leave severity "" when this page
does not state it. Other page types use an empty extracted_violations array.

=== STEP 3: PAGE SCORES ===
Score each criterion for THIS page only, starting from its maximum and applying deductions.
Use "points": null for a criterion that does not apply to this page type.
Coverage is computed by the system from all pages: always use "points": null.
Group integration applies only to introduction or collaboration pages.
Bonus criteria default to 0 and are awarded only for clearly exceptional work.

=== STEP 4: OUTPUT ===
Return ONLY this JSON object, no Markdown fences. Keep comments under 50 words and put
feedback (max 200 words) LAST.

{
  "page_number": {page_number},
  "skip_analysis": false,
  "skip_reason": "",
  "page_type": "heuristic violation analysis",
  "extracted_violations": [{"heuristic_num": 1, "heuristic_name": "Visibility of System Status", "description": "...", "severity": "Major"}],
  "score_breakdown": {
    "coverage": {"points": null, "max": 15, "comment": ""},
    "violation_quality": {"points": 20, "max": 20, "comment": ""},
    "screenshots": {"points": 10, "max": 10, "comment": ""},
    "severity_analysis": {"points": 10, "max": 10, "comment": ""},
    "structure_navigation": {"points": 10, "max": 10, "comment": ""},
    "professional_quality": {"points": 10, "max": 10, "comment": ""},
    "writing_quality": {"points": 10, "max": 10, "comment": ""},
    "group_integration": {"points": null, "max": 15, "comment": ""}
  },
  "bonus_scores": {
    "bonus_ai_opportunities": {"points": 0, "max": 3, "comment": ""},
    "bonus_exceptional_quality": {"points": 0, "max": 2, "comment": ""}
  },
  "feedback": "Brief: heuristics, violations, 2-3 issues, summary."
}"#;

/// 评分提示词的一个版本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptVersion {
    pub version: u32,
    pub label: String,
    pub template: String,
}

impl PromptVersion {
    /// 内置版本
    pub fn default_version() -> Self {
        Self {
            version: 1,
            label: "built-in".to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    pub fn new(version: u32, label: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            version,
            label: label.into(),
            template: strip_fences(&template.into()),
        }
    }

    /// 从 TOML 文件读取（`version`、`label`、`template`）
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(FileError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        let raw: PromptVersion = toml::from_str(&content)
            .map_err(|e| AppError::toml_parse_failed(path.display().to_string(), e))?;
        let prompt = Self::new(raw.version, raw.label, raw.template);
        if prompt.template.trim().is_empty() {
            return Err(AppError::Other(format!("提示词模板为空: {}", path.display())));
        }
        Ok(prompt)
    }

    /// 按配置加载：未配置文件时使用内置版本
    pub fn load_or_default(path: Option<&str>) -> AppResult<Self> {
        match path {
            Some(p) if !p.trim().is_empty() => Self::load(Path::new(p)),
            _ => Ok(Self::default_version()),
        }
    }

    /// 用页面数据填充模板
    pub fn render(&self, page: &PageInput) -> String {
        let content: String = page.text.chars().take(PAGE_CONTENT_LIMIT).collect();
        let content = if page.text.chars().count() > PAGE_CONTENT_LIMIT {
            content + "..."
        } else {
            content
        };
        let word_count = content.split_whitespace().count();

        self.template
            .replace("{heuristics}", &Heuristic::reference_list())
            .replace("{page_number}", &page.page_index.to_string())
            .replace("{word_count}", &word_count.to_string())
            .replace("{has_image}", if page.has_image() { "true" } else { "false" })
            // 页面内容最后替换，避免学生文本中的占位符被二次展开
            .replace("{page_content}", &content)
    }
}

impl std::fmt::Display for PromptVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} ({})", self.version, self.label)
    }
}

/// 去掉模板外层的 Markdown 代码块与结尾分隔线
fn strip_fences(template: &str) -> String {
    let mut text = template.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // 跳过语言标记所在的行
        text = rest.split_once('\n').map_or("", |(_, body)| body).trim();
    }
    if let Some(rest) = text.strip_suffix("---") {
        text = rest.trim();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim();
    }
    text.to_string()
}
