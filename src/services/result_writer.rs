//! 结果写入服务 - 业务能力层
//!
//! 只负责把页面记录、提交结果和 override 日志落盘，不关心流程

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::page::PageRecord;
use crate::models::review::{AppliedOverride, Correction, RiskFlag};
use crate::models::submission::SubmissionResult;

/// 结果写入服务
///
/// 输出布局：
/// - `<id>_page_<n>.json`：单页记录
/// - `<id>_result.json`：提交级结果（每次 override 后覆盖）
/// - `overrides/<id>.jsonl`：追加式 override 日志
/// - `corrections/<id>.jsonl`：追加式 AI 纠错记录
/// - `risk_flags/<id>.json`：当前的人工风险标记
#[derive(Debug, Clone)]
pub struct ResultWriter {
    output_dir: PathBuf,
}

impl ResultWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn page_path(&self, submission_id: &str, page_index: u32) -> PathBuf {
        self.output_dir
            .join(format!("{}_page_{}.json", file_stem(submission_id), page_index))
    }

    pub fn result_path(&self, submission_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_result.json", file_stem(submission_id)))
    }

    pub fn override_log_path(&self, submission_id: &str) -> PathBuf {
        self.output_dir
            .join("overrides")
            .join(format!("{}.jsonl", file_stem(submission_id)))
    }

    pub fn correction_log_path(&self, submission_id: &str) -> PathBuf {
        self.output_dir
            .join("corrections")
            .join(format!("{}.jsonl", file_stem(submission_id)))
    }

    pub fn risk_flags_path(&self, submission_id: &str) -> PathBuf {
        self.output_dir
            .join("risk_flags")
            .join(format!("{}.json", file_stem(submission_id)))
    }

    /// 写入单页记录
    pub async fn write_page(&self, submission_id: &str, record: &PageRecord) -> AppResult<()> {
        let path = self.page_path(submission_id, record.page_index);
        write_json(&path, record).await
    }

    /// 写入提交结果（覆盖旧文件）
    pub async fn write_result(&self, result: &SubmissionResult) -> AppResult<()> {
        let path = self.result_path(&result.submission_id);
        write_json(&path, result).await
    }

    /// 追加一条 override 日志
    pub async fn append_override(&self, entry: &AppliedOverride) -> AppResult<()> {
        debug!(
            "追加 override 日志: {} | 第 {} 页 | {}",
            entry.record.submission_id, entry.record.page_index, entry.record.criterion
        );
        let path = self.override_log_path(&entry.record.submission_id);
        append_json_line(&path, entry).await
    }

    /// 追加一条纠错记录
    pub async fn append_correction(&self, correction: &Correction) -> AppResult<()> {
        debug!(
            "追加纠错记录: {} | 第 {} 页 | {}",
            correction.report.submission_id, correction.report.page_index, correction.report.component
        );
        let path = self.correction_log_path(&correction.report.submission_id);
        append_json_line(&path, correction).await
    }

    /// 覆盖写入某提交当前的风险标记
    pub async fn write_risk_flags(&self, submission_id: &str, flags: &[RiskFlag]) -> AppResult<()> {
        let path = self.risk_flags_path(submission_id);
        write_json(&path, &flags).await
    }
}

async fn append_json_line<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
    ensure_parent(path).await?;

    let mut line = serde_json::to_string(value)?;
    line.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
    file.write_all(line.as_bytes())
        .await
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;

    Ok(())
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
    ensure_parent(path).await?;
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
    debug!("已写入: {}", path.display());
    Ok(())
}

async fn ensure_parent(path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::file_write_failed(parent.display().to_string(), e))?;
    }
    Ok(())
}

/// 提交 ID 中的路径分隔符等字符不能出现在文件名里
fn file_stem(submission_id: &str) -> String {
    submission_id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::page::ExtractionMethod;
    use crate::models::review::{CorrectionReport, OverrideRecord};

    #[test]
    fn test_file_stem_is_sanitized() {
        assert_eq!(file_stem("group-7/final v2"), "group-7_final_v2");
    }

    #[tokio::test]
    async fn test_page_and_override_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());

        let record = PageRecord::skipped(2, "cover page", ExtractionMethod::Strict);
        writer.write_page("g1", &record).await.unwrap();
        let saved: PageRecord =
            serde_json::from_str(&std::fs::read_to_string(writer.page_path("g1", 2)).unwrap()).unwrap();
        assert_eq!(saved, record);

        for sequence in 1..=2 {
            let entry = AppliedOverride {
                sequence,
                record: OverrideRecord::new("g1", 3, "screenshots", 8),
                previous_value: Some(10),
                applied_at: chrono::Utc::now(),
            };
            writer.append_override(&entry).await.unwrap();
        }
        let log = std::fs::read_to_string(writer.override_log_path("g1")).unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: AppliedOverride = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.record.reviewer, "Anonymous");
    }

    #[tokio::test]
    async fn test_correction_and_risk_flag_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());

        let correction = Correction {
            sequence: 1,
            report: CorrectionReport::new("g1", 2, "feedback", "too generic"),
            reported_at: chrono::Utc::now(),
        };
        writer.append_correction(&correction).await.unwrap();
        let log = std::fs::read_to_string(writer.correction_log_path("g1")).unwrap();
        let saved: Correction = serde_json::from_str(log.trim_end()).unwrap();
        assert_eq!(saved, correction);

        let flags = vec![RiskFlag {
            page_index: 4,
            notes: "possible copied text".to_string(),
            flagged_at: chrono::Utc::now(),
        }];
        writer.write_risk_flags("g1", &flags).await.unwrap();
        writer.write_risk_flags("g1", &[]).await.unwrap();
        let saved: Vec<RiskFlag> =
            serde_json::from_str(&std::fs::read_to_string(writer.risk_flags_path("g1")).unwrap()).unwrap();
        assert!(saved.is_empty());
    }
}
