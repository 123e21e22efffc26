//! 统一错误类型定义
//!
//! 按故障域拆分错误枚举，各层只返回自己领域的错误：
//! - `ValidationError` - 输入 Excel 文件校验失败（启动阶段即终止）
//! - `CaptchaError` - 验证码图片预检失败（跳过本次识别，不跨层抛出）
//! - `PortalError` - 浏览器 / GST 门户交互失败
//! - `StorageError` - 断点、任务记录、Excel 落盘失败
//!
//! `AppError` 是对外的伞类型，库的使用方可以统一 match。

use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 输入文件校验错误
    #[error("文件校验错误: {0}")]
    Validation(#[from] ValidationError),

    /// 验证码图片错误
    #[error("验证码错误: {0}")]
    Captcha(#[from] CaptchaError),

    /// 浏览器 / 门户交互错误
    #[error("门户交互错误: {0}")]
    Portal(#[from] PortalError),

    /// 存储相关错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
}

/// 输入文件校验错误
///
/// 任何一个变体都意味着本次运行无法继续，启动时直接报告并退出。
#[derive(Error, Debug)]
pub enum ValidationError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    FileNotFound { path: String },

    /// 文件无法打开读取
    #[error("文件无法读取 ({path}): {message}")]
    FileUnreadable { path: String, message: String },

    /// 扩展名不是 .xlsx / .xls
    #[error("不支持的文件格式: {path}（仅支持 .xlsx / .xls）")]
    UnsupportedExtension { path: String },

    /// 表头中找不到 PAN 列
    #[error("{sheet} 表中缺少 PAN 列")]
    PanColumnMissing { sheet: String },

    /// PAN 列存在但没有任何数据
    #[error("{sheet} 表的 PAN 列没有任何数据")]
    PanColumnEmpty { sheet: String },
}

/// 验证码图片预检错误
///
/// 截图在发给 TrueCaptcha 之前逐项检查，任何一项不通过都放弃本次识别，
/// 由上层刷新页面后重新截图。
#[derive(Error, Debug)]
pub enum CaptchaError {
    /// 截图文件不存在
    #[error("验证码图片不存在: {path}")]
    ImageMissing { path: String },

    /// 截图是空文件
    #[error("验证码图片为空文件: {path}")]
    ImageEmpty { path: String },

    /// 文件太小，页面大概率还没渲染完
    #[error("验证码图片过小 ({size} 字节)，疑似尚未渲染完成")]
    ImageTooSmall { size: u64 },

    /// 图片字节无法解码
    #[error("验证码图片无法解码: {message}")]
    ImageUndecodable { message: String },

    /// 宽或高小于等于 2 像素
    #[error("验证码图片尺寸异常: {width}x{height}")]
    BadDimensions { width: u32, height: u32 },

    /// 平均灰度超过 240，基本是一张白图
    #[error("验证码图片接近全白 (平均灰度 {mean:.1})，疑似加载占位图")]
    MostlyBlank { mean: f64 },
}

/// 浏览器 / 门户交互错误
#[derive(Error, Debug)]
pub enum PortalError {
    /// 浏览器启动失败
    #[error("浏览器启动失败: {message}")]
    LaunchFailed { message: String },

    /// 页面导航失败
    #[error("页面导航失败 ({url}): {message}")]
    NavigationFailed { url: String, message: String },

    /// 等待元素出现超时
    #[error("等待元素超时: {selector} ({timeout_secs}s)")]
    ElementTimeout { selector: String, timeout_secs: u64 },

    /// 浏览器会话已经失效（需要重启浏览器）
    #[error("浏览器会话已失效")]
    SessionLost,

    /// 页面脚本执行失败
    #[error("页面脚本执行失败: {message}")]
    ScriptFailed { message: String },
}

/// 存储层错误
#[derive(Error, Debug)]
pub enum StorageError {
    /// 写入普通文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 读取 Excel 失败
    #[error("读取 Excel 失败 ({path}): {message}")]
    ExcelReadFailed { path: String, message: String },

    /// 写入 Excel 失败
    #[error("写入 Excel 失败 ({path}): {message}")]
    ExcelWriteFailed { path: String, message: String },

    /// JSON 序列化/反序列化失败
    #[error("JSON 处理失败: {0}")]
    JsonFailed(#[from] serde_json::Error),
}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<chromiumoxide::error::CdpError> for PortalError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        PortalError::ScriptFailed {
            message: err.to_string(),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Portal(PortalError::from(err))
    }
}

// ========== 便捷构造函数 ==========

impl PortalError {
    /// 创建导航失败错误
    pub fn navigation_failed(url: impl Into<String>, source: impl std::fmt::Display) -> Self {
        PortalError::NavigationFailed {
            url: url.into(),
            message: source.to_string(),
        }
    }
}

impl StorageError {
    /// 创建 Excel 读取错误
    pub fn excel_read(path: impl Into<String>, source: impl std::fmt::Display) -> Self {
        StorageError::ExcelReadFailed {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// 创建 Excel 写入错误
    pub fn excel_write(path: impl Into<String>, source: impl std::fmt::Display) -> Self {
        StorageError::ExcelWriteFailed {
            path: path.into(),
            message: source.to_string(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
