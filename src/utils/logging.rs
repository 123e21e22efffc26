//! 日志工具模块
//!
//! 提供日志格式化和输出的辅助函数

use anyhow::Result;
use std::fs;
use tracing::info;

use crate::utils::time;

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
///
/// # 返回
/// 返回是否成功初始化
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\nPAN-GSTIN 处理日志 - {}\n{}\n\n",
        "=".repeat(60),
        time::now_display(),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `excel_file`: 输入文件路径
/// - `headless`: 是否无头模式
pub fn log_startup(excel_file: &str, headless: bool) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - PAN 批量查询模式");
    info!("📄 输入文件: {}", excel_file);
    info!("🖥️ 浏览器模式: {}", if headless { "无头" } else { "有界面" });
    info!("{}", "=".repeat(60));
}

/// 记录待处理 PAN 加载信息
///
/// # 参数
/// - `total`: 本次要处理的 PAN 数量
/// - `skipped`: 断点续传跳过的数量
/// - `batch_size`: 断点保存批大小
pub fn log_pans_loaded(total: usize, skipped: usize, batch_size: usize) {
    info!("✓ 找到 {} 个待处理的 PAN", total);
    if skipped > 0 {
        info!("⏩ 断点续传: 跳过已处理的 {} 个", skipped);
    }
    info!("💾 每处理 {} 个保存一次断点\n", batch_size);
}

/// 打印最终统计信息
///
/// # 参数
/// - `success`: 成功数量
/// - `failed`: 失败数量
/// - `total`: 总数
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(success: usize, failed: usize, total: usize, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!("完成时间: {}", time::now_display());
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
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
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("0123456789abc", 10), "0123456789...");
    }
}
