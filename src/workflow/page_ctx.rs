//! 页面处理上下文
//!
//! 封装"我正在处理哪个提交的第几页"这一信息

use std::fmt::Display;

use crate::services::extraction::ExtractionCtx;

/// 页面处理上下文
#[derive(Debug, Clone)]
pub struct PageCtx {
    /// 提交ID
    pub submission_id: String,

    /// 调度时的页码
    pub page_index: u32,

    /// 页面总数（仅用于日志显示）
    pub page_count: usize,
}

impl PageCtx {
    pub fn new(submission_id: impl Into<String>, page_index: u32, page_count: usize) -> Self {
        Self {
            submission_id: submission_id.into(),
            page_index,
            page_count,
        }
    }

    pub fn extraction_ctx(&self) -> ExtractionCtx<'_> {
        ExtractionCtx::new(&self.submission_id, self.page_index)
    }
}

impl Display for PageCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[提交 {} 第 {} 页/共 {} 页]",
            self.submission_id, self.page_index, self.page_count
        )
    }
}
