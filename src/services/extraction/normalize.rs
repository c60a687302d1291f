//! JSON → `PageRecord` 规范化
//!
//! 严格模式与宽松模式共用同一条路径：严格模式遇到不合规字段直接报错，
//! 宽松模式则截断、夹紧或丢弃。因此一份完全合规的响应无论走哪种模式，
//! 得到的记录完全一致。

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::models::heuristic::Heuristic;
use crate::models::page::{
    ExtractionMethod, PageClassification, PageRecord, PageScore, Severity, Violation,
};
use crate::models::rubric::CriterionId;

pub const FEEDBACK_WORD_LIMIT: usize = 200;
pub const COMMENT_WORD_LIMIT: usize = 50;
pub const DESCRIPTION_WORD_LIMIT: usize = 30;
pub const PAGE_TYPE_WORD_LIMIT: usize = 20;
pub const SKIP_REASON_WORD_LIMIT: usize = 30;

pub const REASON_UNPARSEABLE: &str = "unparseable";
const REASON_SKIPPED: &str = "skipped by classifier";

/// 能被识别的顶层字段
pub const KNOWN_FIELDS: [&str; 7] = [
    "skip_analysis",
    "skip_reason",
    "page_type",
    "extracted_violations",
    "score_breakdown",
    "bonus_scores",
    "feedback",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Strict,
    Lenient,
}

/// 不满足 schema 的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError(pub String);

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn schema_err<T>(msg: impl Into<String>) -> Result<T, SchemaError> {
    Err(SchemaError(msg.into()))
}

/// 对象中是否至少包含一个可识别字段
pub fn has_known_fields(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| KNOWN_FIELDS.iter().any(|k| obj.contains_key(*k)))
}

/// 把模型输出的 JSON 对象转换为页面记录
///
/// 页码一律使用调度时的页码，忽略模型回显的 `page_number`。
pub fn record_from_value(
    value: &Value,
    page_index: u32,
    mode: Mode,
    method: ExtractionMethod,
) -> Result<PageRecord, SchemaError> {
    let Some(obj) = value.as_object() else {
        return schema_err("响应不是 JSON 对象");
    };

    let page_type = optional_text(obj, "page_type", mode)?
        .map(|s| truncate_words(&s, PAGE_TYPE_WORD_LIMIT))
        .unwrap_or_default();
    let feedback = optional_text(obj, "feedback", mode)?
        .map(|s| truncate_words(&s, FEEDBACK_WORD_LIMIT))
        .unwrap_or_default();

    let skip = match obj.get("skip_analysis") {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) if mode == Mode::Lenient => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Some(other) if mode == Mode::Strict => {
            return schema_err(format!("skip_analysis 不是布尔值: {}", other));
        }
        None if mode == Mode::Strict => return schema_err("缺少 skip_analysis"),
        _ => None,
    };

    let classification = match skip {
        Some(false) => PageClassification::Content,
        Some(true) => {
            let reason = optional_text(obj, "skip_reason", mode)?
                .map(|s| truncate_words(&s, SKIP_REASON_WORD_LIMIT))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| REASON_SKIPPED.to_string());
            PageClassification::Skip { reason }
        }
        None => PageClassification::Skip {
            reason: REASON_UNPARSEABLE.to_string(),
        },
    };

    if let PageClassification::Skip { .. } = classification {
        // 跳过页不贡献任何分数和问题
        return Ok(PageRecord {
            page_index,
            classification,
            page_type,
            violations: Vec::new(),
            scores: BTreeMap::new(),
            feedback,
            extraction: method,
        });
    }

    let violations = parse_violations(obj.get("extracted_violations"), mode)?;

    if mode == Mode::Strict && !obj.get("score_breakdown").is_some_and(Value::is_object) {
        return schema_err("内容页缺少 score_breakdown");
    }
    let mut scores = BTreeMap::new();
    for section in ["score_breakdown", "bonus_scores"] {
        match obj.get(section) {
            Some(Value::Object(entries)) => parse_scores(entries, mode, &mut scores)?,
            None | Some(Value::Null) => {}
            Some(other) if mode == Mode::Strict => {
                return schema_err(format!("{} 不是对象: {}", section, other));
            }
            Some(_) => {}
        }
    }

    Ok(PageRecord {
        page_index,
        classification,
        page_type,
        violations,
        scores,
        feedback,
        extraction: method,
    })
}

fn optional_text(obj: &Map<String, Value>, key: &str, mode: Mode) -> Result<Option<String>, SchemaError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) if mode == Mode::Lenient => Ok(Some(other.to_string())),
        Some(other) => schema_err(format!("{} 不是字符串: {}", key, other)),
    }
}

fn parse_violations(value: Option<&Value>, mode: Mode) -> Result<Vec<Violation>, SchemaError> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) if mode == Mode::Strict => {
            return schema_err(format!("extracted_violations 不是数组: {}", other));
        }
        Some(_) => return Ok(Vec::new()),
    };

    let mut violations = Vec::with_capacity(items.len());
    for item in items {
        match parse_violation(item, mode)? {
            Some(v) => violations.push(v),
            None => tracing::debug!("丢弃无法识别的问题条目: {}", item),
        }
    }
    Ok(violations)
}

fn parse_violation(item: &Value, mode: Mode) -> Result<Option<Violation>, SchemaError> {
    let Some(obj) = item.as_object() else {
        return match mode {
            Mode::Strict => schema_err(format!("问题条目不是对象: {}", item)),
            Mode::Lenient => Ok(None),
        };
    };

    let raw_num = match obj.get("heuristic_num") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) if mode == Mode::Lenient => s.trim().parse().ok(),
        _ => None,
    };
    let name = obj
        .get("heuristic_name")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if mode == Mode::Strict && !raw_num.is_some_and(|n| (1..=10).contains(&n)) {
        return schema_err(format!("heuristic_num 不在 1-10 范围内: {:?}", obj.get("heuristic_num")));
    }
    let Some(heuristic) = Heuristic::resolve(raw_num, name) else {
        return Ok(None);
    };

    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(|s| truncate_words(s.trim(), DESCRIPTION_WORD_LIMIT))
        .unwrap_or_default();

    let severity = match obj.get("severity") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(raw) => {
            let text = match raw {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match (Severity::parse(&text), mode) {
                (Some(severity), _) => Some(severity),
                (None, Mode::Strict) => return schema_err(format!("无法识别的严重程度: {}", text)),
                (None, Mode::Lenient) => None,
            }
        }
    };

    Ok(Some(Violation {
        heuristic,
        heuristic_name: heuristic.name().to_string(),
        description,
        severity,
    }))
}

fn parse_scores(
    entries: &Map<String, Value>,
    mode: Mode,
    scores: &mut BTreeMap<CriterionId, PageScore>,
) -> Result<(), SchemaError> {
    for (key, entry) in entries {
        // 多余的键在两种模式下都忽略
        let Some(criterion) = CriterionId::from_key(key) else {
            continue;
        };
        let max = criterion.max_points() as i64;

        let (raw_points, comment) = match entry {
            Value::Object(fields) => (
                fields.get("points").cloned().unwrap_or(Value::Null),
                fields
                    .get("comment")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| truncate_words(s, COMMENT_WORD_LIMIT)),
            ),
            Value::Number(_) if mode == Mode::Lenient => (entry.clone(), None),
            other if mode == Mode::Strict => {
                return schema_err(format!("{} 的评分格式无效: {}", key, other));
            }
            _ => continue,
        };

        let points = match &raw_points {
            Value::Null => continue, // 本页不适用
            Value::Number(n) => match (n.as_i64(), mode) {
                (Some(p), _) => p,
                (None, Mode::Lenient) => match n.as_f64() {
                    Some(f) => f.round() as i64,
                    None => continue,
                },
                (None, Mode::Strict) => return schema_err(format!("{} 的分数不是整数: {}", key, n)),
            },
            Value::String(s) if mode == Mode::Lenient => match s.trim().parse::<i64>() {
                Ok(p) => p,
                Err(_) => continue,
            },
            other if mode == Mode::Strict => {
                return schema_err(format!("{} 的分数不是数字: {}", key, other));
            }
            _ => continue,
        };

        if !(0..=max).contains(&points) {
            if mode == Mode::Strict {
                return schema_err(format!("{} 的分数 {} 超出范围 [0, {}]", key, points, max));
            }
            tracing::debug!("{} 的分数 {} 超出范围，夹紧到 [0, {}]", key, points, max);
        }

        scores.insert(
            criterion,
            PageScore {
                points: points.clamp(0, max) as u32,
                comment,
                overridden: false,
            },
        );
    }
    Ok(())
}

/// 按词数截断，超出时追加省略号；未超出时原样返回（去掉首尾空白）
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let trimmed = text.trim();
    if trimmed.split_whitespace().count() <= max_words {
        return trimmed.to_string();
    }
    let mut out = trimmed
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ");
    out.push_str("...");
    out
}
