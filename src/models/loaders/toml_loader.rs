use crate::error::{AppError, FileError};
use crate::models::input::{PageInput, SubmissionInput};
use crate::models::review::{CorrectionReport, FlaggedPage, OverrideRecord};
use anyhow::{Context, Result};
use base64::Engine;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 复核文件后缀：`<清单名>.overrides.toml`
const OVERRIDES_SUFFIX: &str = ".overrides.toml";

#[derive(Debug, Deserialize)]
struct SubmissionManifest {
    submission_id: String,
    #[serde(default)]
    pages: Vec<PageManifest>,
}

#[derive(Debug, Deserialize)]
struct PageManifest {
    page_index: u32,
    #[serde(default)]
    text: String,
    /// 相对于清单文件所在目录
    image_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewFile {
    #[serde(default)]
    overrides: Vec<ReviewEntry>,
    #[serde(default)]
    corrections: Vec<CorrectionEntry>,
    #[serde(default)]
    risk_flags: Vec<FlaggedPage>,
}

#[derive(Debug, Deserialize)]
struct CorrectionEntry {
    page_index: u32,
    component: String,
    reason: String,
    original_value: Option<String>,
    corrected_value: Option<String>,
    #[serde(default)]
    reviewer_notes: String,
}

/// 一份复核文件的全部内容，按文件中的顺序回放
#[derive(Debug, Default)]
pub struct ReviewBundle {
    pub overrides: Vec<OverrideRecord>,
    pub corrections: Vec<CorrectionReport>,
    pub risk_flags: Vec<FlaggedPage>,
}

impl ReviewBundle {
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty() && self.corrections.is_empty() && self.risk_flags.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ReviewEntry {
    page_index: u32,
    criterion: String,
    value: i64,
    #[serde(default)]
    reviewer_note: String,
    reviewer: Option<String>,
}

/// 从 TOML 清单加载一份提交，图片以 data URL 形式内嵌
pub async fn load_toml_to_submission(toml_file_path: &Path) -> Result<SubmissionInput> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let manifest: SubmissionManifest = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    let base_dir = toml_file_path.parent().unwrap_or_else(|| Path::new("."));
    let mut pages = Vec::with_capacity(manifest.pages.len());
    for page in manifest.pages {
        let image = match &page.image_path {
            Some(rel) => Some(load_image_as_data_url(&base_dir.join(rel)).await?),
            None => None,
        };
        pages.push(PageInput {
            page_index: page.page_index,
            text: page.text,
            image,
        });
    }

    let submission = SubmissionInput::new(manifest.submission_id, pages);
    submission
        .validate()
        .with_context(|| format!("提交清单无效: {}", toml_file_path.display()))?;

    Ok(submission)
}

/// 从文件夹中加载所有提交清单（跳过复核文件）
pub async fn load_all_submissions(folder_path: &str) -> Result<Vec<(PathBuf, SubmissionInput)>> {
    let folder = PathBuf::from(folder_path);

    if !folder.is_dir() {
        return Err(AppError::from(FileError::DirectoryNotFound {
            path: folder_path.to_string(),
        })
        .into());
    }

    let mut manifest_paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
        if path.extension().and_then(|s| s.to_str()) == Some("toml")
            && !file_name.ends_with(OVERRIDES_SUFFIX)
        {
            manifest_paths.push(path);
        }
    }
    // 保证处理顺序稳定
    manifest_paths.sort();

    let mut submissions = Vec::new();
    for path in manifest_paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_toml_to_submission(&path).await {
            Ok(submission) => {
                tracing::info!("成功加载 {} 页", submission.pages.len());
                submissions.push((path, submission));
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(submissions)
}

/// 读取清单旁的复核文件；不存在时返回空内容
pub async fn load_review_file(manifest_path: &Path, submission_id: &str) -> Result<ReviewBundle> {
    let review_path = review_file_path(manifest_path);
    if !fs::try_exists(&review_path).await.unwrap_or(false) {
        return Ok(ReviewBundle::default());
    }

    let content = fs::read_to_string(&review_path)
        .await
        .with_context(|| format!("无法读取复核文件: {}", review_path.display()))?;
    let review: ReviewFile = toml::from_str(&content)
        .with_context(|| format!("无法解析复核文件: {}", review_path.display()))?;

    let overrides = review
        .overrides
        .into_iter()
        .map(|entry| {
            let record = OverrideRecord::new(submission_id, entry.page_index, entry.criterion, entry.value)
                .with_note(entry.reviewer_note);
            match entry.reviewer {
                Some(reviewer) => record.with_reviewer(reviewer),
                None => record,
            }
        })
        .collect();

    let corrections = review
        .corrections
        .into_iter()
        .map(|entry| CorrectionReport {
            submission_id: submission_id.to_string(),
            page_index: entry.page_index,
            component: entry.component,
            reason: entry.reason,
            original_value: entry.original_value,
            corrected_value: entry.corrected_value,
            reviewer_notes: entry.reviewer_notes,
        })
        .collect();

    Ok(ReviewBundle {
        overrides,
        corrections,
        risk_flags: review.risk_flags,
    })
}

fn review_file_path(manifest_path: &Path) -> PathBuf {
    let stem = manifest_path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    manifest_path.with_file_name(format!("{}{}", stem, OVERRIDES_SUFFIX))
}

async fn load_image_as_data_url(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("无法读取页面图片: {}", path.display()))?;
    let mime = match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime, encoded))
}
