//! 评分输入：由 PDF 渲染端产出的逐页数据

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::SubmissionError;

/// 单页输入
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInput {
    pub page_index: u32,
    #[serde(default)]
    pub text: String,
    /// 页面截图（data URL 或可访问的 URL）
    #[serde(default)]
    pub image: Option<String>,
}

impl PageInput {
    pub fn new(page_index: u32, text: impl Into<String>) -> Self {
        Self {
            page_index,
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn has_image(&self) -> bool {
        self.image.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// 一份提交（按页序排列）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionInput {
    pub submission_id: String,
    pub pages: Vec<PageInput>,
}

impl SubmissionInput {
    pub fn new(submission_id: impl Into<String>, pages: Vec<PageInput>) -> Self {
        Self {
            submission_id: submission_id.into(),
            pages,
        }
    }

    /// 页码必须唯一，且至少有一页
    pub fn validate(&self) -> Result<(), SubmissionError> {
        if self.pages.is_empty() {
            return Err(SubmissionError::Empty {
                submission_id: self.submission_id.clone(),
            });
        }
        let mut seen = HashSet::new();
        for page in &self.pages {
            if !seen.insert(page.page_index) {
                return Err(SubmissionError::DuplicatePage {
                    submission_id: self.submission_id.clone(),
                    page_index: page.page_index,
                });
            }
        }
        Ok(())
    }

    pub fn page_indices(&self) -> Vec<u32> {
        self.pages.iter().map(|p| p.page_index).collect()
    }
}
