//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数

use std::fs;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::models::prompt::PromptVersion;

/// 初始化 tracing 订阅者
///
/// 过滤级别读取 `RUST_LOG`，默认 `rubric_grader=info`。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rubric_grader=info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}

/// 初始化日志文件
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n评分日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, prompt: &PromptVersion) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 逐页并发评分模式");
    info!("📊 单提交最大并发页数: {}", config.max_concurrent_pages);
    info!("⏱️ 单页超时: {} 秒", config.llm_timeout_secs);
    info!("🤖 模型: {} | 提示词: {}", config.llm_model_name, prompt);
    info!("{}", "=".repeat(60));
}

/// 记录提交加载信息
pub fn log_submissions_loaded(total: usize, max_concurrent_pages: usize) {
    info!("✓ 找到 {} 个待评分的提交", total);
    info!("📋 每个提交内最多 {} 页同时评分\n", max_concurrent_pages);
}

/// 打印最终统计信息
pub fn print_final_stats(
    success: usize,
    failed: usize,
    total: usize,
    degraded_pages: usize,
    overrides_applied: usize,
    overrides_rejected: usize,
    overrides_failed: usize,
    log_file_path: &str,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("⚠️ 降级页面: {}", degraded_pages);
    info!(
        "✏️ 人工复核: 应用 {} / 拒绝 {} / 出错 {}",
        overrides_applied, overrides_rejected, overrides_failed
    );
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("评分日志测试", 4), "评分日志...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn test_init_log_file_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        init_log_file(path.to_str().unwrap()).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("评分日志"));
    }
}
