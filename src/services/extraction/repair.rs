//! 修复解析：处理被截断、被 Markdown 包裹或夹杂说明文字的响应
//!
//! 依次尝试：
//! 1. 定位 JSON 主体（代码块或第一个 `{`）
//! 2. 补全截断的 JSON（补引号、去掉悬空的 `,`/`:`、按栈顺序补括号），
//!    仍失败则回退到更早的逗号处重试
//! 3. 逐字段正则搜索，重建部分对象

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::error::AppResult;
use crate::models::page::{ExtractionMethod, PageRecord};
use crate::models::rubric::CriterionId;
use crate::services::extraction::normalize::{
    has_known_fields, record_from_value, Mode, KNOWN_FIELDS,
};
use crate::services::extraction::{ExtractionCtx, ExtractionStrategy, StrategyFailure};

/// 截断补全时最多回退的逗号数
const MAX_CUT_BACKS: usize = 24;
/// 单条问题的搜索窗口（字节）
const VIOLATION_WINDOW: usize = 800;

/// 字段级正则（全部使用有界量词）
struct FieldPatterns {
    fenced: Regex,
    trailing_comma: Regex,
    page_type: Regex,
    skip_analysis: Regex,
    skip_reason: Regex,
    feedback: Regex,
    heuristic_num: Regex,
    heuristic_name: Regex,
    description: Regex,
    severity: Regex,
    criteria: Vec<(CriterionId, Regex)>,
}

impl FieldPatterns {
    fn compile() -> AppResult<Self> {
        let criteria = CriterionId::all()
            .map(|criterion| {
                let pattern = format!(
                    r#""{}"\s*:\s*\{{\s*"points"\s*:\s*(-?\d{{1,4}}|null)(?:\s*,\s*"max"\s*:\s*\d{{1,4}})?(?:\s*,\s*"comment"\s*:\s*"((?:[^"\\]|\\.){{0,600}})")?"#,
                    criterion.key()
                );
                Regex::new(&pattern).map(|re| (criterion, re))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            fenced: Regex::new(r"```(?:json|JSON)?\s*(\{[\s\S]*?)(?:```|$)")?,
            trailing_comma: Regex::new(r",(\s*[}\]])")?,
            page_type: Regex::new(r#""page_type"\s*:\s*"((?:[^"\\]|\\.){0,300})""#)?,
            skip_analysis: Regex::new(r#""skip_analysis"\s*:\s*(true|false)"#)?,
            skip_reason: Regex::new(r#""skip_reason"\s*:\s*"((?:[^"\\]|\\.){0,500})""#)?,
            // 不要求闭合引号：反馈通常是被截断的那个字段
            feedback: Regex::new(r#""feedback"\s*:\s*"((?:[^"\\]|\\.){0,4000})"#)?,
            heuristic_num: Regex::new(r#""heuristic_num"\s*:\s*"?(\d{1,2})"#)?,
            heuristic_name: Regex::new(r#""heuristic_name"\s*:\s*"((?:[^"\\]|\\.){0,200})""#)?,
            description: Regex::new(r#""description"\s*:\s*"((?:[^"\\]|\\.){0,600})"#)?,
            severity: Regex::new(r#""severity"\s*:\s*"?((?:[^"\\,}]|\\.){0,40})"#)?,
            criteria,
        })
    }
}

/// 修复解析策略
pub struct RepairStrategy {
    patterns: FieldPatterns,
}

impl RepairStrategy {
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            patterns: FieldPatterns::compile()?,
        })
    }

    /// 定位 JSON 主体：优先代码块，其次第一个 `{`
    fn locate_body<'a>(&self, raw: &'a str) -> Option<&'a str> {
        if let Some(caps) = self.patterns.fenced.captures(raw) {
            if let Some(body) = caps.get(1) {
                return Some(body.as_str());
            }
        }
        raw.find('{').map(|start| &raw[start..])
    }

    /// 尝试把（可能截断的）JSON 主体恢复成一个值
    ///
    /// 第二个返回值表示是否回退到了更早的逗号（会丢弃其后的数据）。
    fn recover_value(&self, body: &str) -> Option<(Value, bool)> {
        if let Some(end) = complete_object_end(body) {
            let candidate = self.strip_trailing_commas(&body[..end]);
            if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
                return Some((value, false));
            }
        }

        let mut cuts = vec![body.len()];
        cuts.extend(unquoted_commas(body).into_iter().rev().take(MAX_CUT_BACKS));

        for cut in cuts {
            let closed = close_truncated(&body[..cut]);
            let candidate = self.strip_trailing_commas(&closed);
            if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
                let cut_back = cut < body.len();
                if cut_back {
                    tracing::debug!("在第 {} 字节处截断后补全成功", cut);
                }
                return Some((value, cut_back));
            }
        }
        None
    }

    fn strip_trailing_commas(&self, text: &str) -> String {
        self.patterns.trailing_comma.replace_all(text, "$1").into_owned()
    }

    /// 逐字段搜索，重建部分对象；一个字段都找不到时返回 `None`
    fn scan_fields(&self, raw: &str) -> Option<Value> {
        let p = &self.patterns;
        let mut obj = Map::new();

        if let Some(caps) = p.skip_analysis.captures(raw) {
            obj.insert("skip_analysis".into(), Value::Bool(&caps[1] == "true"));
        }
        for (key, re) in [
            ("page_type", &p.page_type),
            ("skip_reason", &p.skip_reason),
            ("feedback", &p.feedback),
        ] {
            if let Some(caps) = re.captures(raw) {
                obj.insert(key.into(), Value::String(unescape(&caps[1])));
            }
        }

        let violations = self.scan_violations(raw);
        if !violations.is_empty() {
            obj.insert("extracted_violations".into(), Value::Array(violations));
        }

        let mut breakdown = Map::new();
        let mut bonus = Map::new();
        for (criterion, re) in &p.criteria {
            let Some(caps) = re.captures(raw) else {
                continue;
            };
            let points = match &caps[1] {
                "null" => Value::Null,
                digits => digits.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            };
            let comment = caps.get(2).map(|m| unescape(m.as_str())).unwrap_or_default();
            let entry = json!({"points": points, "comment": comment});
            if criterion.is_bonus() {
                bonus.insert(criterion.key().into(), entry);
            } else {
                breakdown.insert(criterion.key().into(), entry);
            }
        }
        if !breakdown.is_empty() {
            obj.insert("score_breakdown".into(), Value::Object(breakdown));
        }
        if !bonus.is_empty() {
            obj.insert("bonus_scores".into(), Value::Object(bonus));
        }

        if obj.is_empty() {
            None
        } else {
            Some(Value::Object(obj))
        }
    }

    fn scan_violations(&self, raw: &str) -> Vec<Value> {
        let p = &self.patterns;
        let starts: Vec<_> = p.heuristic_num.captures_iter(raw).collect();

        let mut violations = Vec::new();
        for (i, caps) in starts.iter().enumerate() {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let next_start = starts
                .get(i + 1)
                .and_then(|c| c.get(0))
                .map_or(raw.len(), |m| m.start());
            let end = floor_char_boundary(raw, next_start.min(whole.start() + VIOLATION_WINDOW));
            let window = &raw[whole.start()..end];

            let num: i64 = caps[1].parse().unwrap_or(0);
            let field = |re: &Regex| {
                re.captures(window)
                    .and_then(|c| c.get(1))
                    .map(|m| unescape(m.as_str()))
                    .unwrap_or_default()
            };
            violations.push(json!({
                "heuristic_num": num,
                "heuristic_name": field(&p.heuristic_name),
                "description": field(&p.description),
                "severity": field(&p.severity).trim().trim_matches('"').to_string(),
            }));
        }
        violations
    }
}

impl ExtractionStrategy for RepairStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Repair
    }

    fn extract(&self, raw: &str, ctx: &ExtractionCtx<'_>) -> Result<PageRecord, StrategyFailure> {
        let recovered = self
            .locate_body(raw)
            .and_then(|body| self.recover_value(body))
            .filter(|(value, _)| has_known_fields(value));

        let value = match recovered {
            Some((value, false)) => value,
            // 回退补全会丢字段，与逐字段搜索比较，取恢复得更多的一方
            Some((value, true)) => match self.scan_fields(raw) {
                Some(scanned) if field_weight(&scanned) > field_weight(&value) => {
                    tracing::debug!("{} 逐字段搜索比回退补全恢复了更多字段", ctx);
                    scanned
                }
                _ => value,
            },
            None => {
                tracing::debug!("{} JSON 无法补全，改为逐字段搜索", ctx);
                self.scan_fields(raw)
                    .ok_or_else(|| StrategyFailure::new("未能恢复任何字段"))?
            }
        };

        record_from_value(&value, ctx.page_index, Mode::Lenient, ExtractionMethod::Repair)
            .map_err(|e| StrategyFailure::new(e.to_string()))
    }
}

/// 恢复出的字段数量：顶层字段 + 问题条数 + 评分项数
fn field_weight(value: &Value) -> usize {
    let Some(obj) = value.as_object() else {
        return 0;
    };
    let top = KNOWN_FIELDS.iter().filter(|k| obj.contains_key(**k)).count();
    let violations = obj
        .get("extracted_violations")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let scores: usize = ["score_breakdown", "bonus_scores"]
        .iter()
        .filter_map(|section| obj.get(*section).and_then(Value::as_object))
        .map(Map::len)
        .sum();
    top + violations + scores
}

/// 若文本以一个完整对象开头，返回对象结束位置（不含其后的说明文字）
fn complete_object_end(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if in_string {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// 字符串之外的逗号位置（任意嵌套层级）
fn unquoted_commas(body: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if in_string {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ',' => positions.push(i),
            _ => {}
        }
    }
    positions
}

/// 补全截断的 JSON 文本
fn close_truncated(text: &str) -> String {
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }

    let mut out = if in_string {
        let mut s = text.to_string();
        if escaped {
            // 悬空的反斜杠
            s.pop();
        }
        s.push('"');
        s
    } else {
        text.trim_end().to_string()
    };

    loop {
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
        if out.ends_with(',') {
            out.pop();
        } else if out.ends_with(':') {
            out.push_str("null");
            break;
        } else {
            break;
        }
    }

    out.extend(closers.iter().rev());
    out
}

fn unescape(captured: &str) -> String {
    let cleaned = captured.strip_suffix('\\').unwrap_or(captured);
    serde_json::from_str::<String>(&format!("\"{}\"", cleaned)).unwrap_or_else(|_| cleaned.to_string())
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
