//! 日志初始化
//!
//! 基于 tracing-subscriber，默认 info 级别；
//! 设置 RUST_LOG 环境变量可以覆盖（例如 RUST_LOG=debug）。

use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅器
pub fn init() {
    init_with_level("info");
}

/// 以指定的默认级别初始化（测试模式下用 debug）
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // 重复初始化（例如测试里）直接忽略
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
