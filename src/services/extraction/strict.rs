use serde_json::Value;

use crate::models::page::{ExtractionMethod, PageRecord};
use crate::services::extraction::normalize::{record_from_value, Mode};
use crate::services::extraction::{ExtractionCtx, ExtractionStrategy, StrategyFailure};

/// 严格解析：整段响应必须是一个完整且合规的 JSON 对象
pub struct StrictStrategy;

impl ExtractionStrategy for StrictStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Strict
    }

    fn extract(&self, raw: &str, ctx: &ExtractionCtx<'_>) -> Result<PageRecord, StrategyFailure> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|e| StrategyFailure::new(format!("JSON 解析失败: {}", e)))?;
        record_from_value(&value, ctx.page_index, Mode::Strict, ExtractionMethod::Strict)
            .map_err(|e| StrategyFailure::new(format!("schema 校验失败: {}", e)))
    }
}
