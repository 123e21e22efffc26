//! PAN 处理上下文
//!
//! 封装"我正在处理第几个 PAN"这一信息

use std::fmt::Display;

/// PAN 处理上下文
///
/// 包含处理单个 PAN 所需的所有上下文信息
#[derive(Debug, Clone)]
pub struct PanCtx {
    /// PAN 号码（已大写去空格）
    pub pan: String,

    /// 在本次工作列表中的序号（从1开始，仅用于日志显示）
    pub index: usize,

    /// 本次工作列表的总数
    pub total: usize,
}

impl PanCtx {
    /// 创建新的 PAN 上下文
    pub fn new(pan: String, index: usize, total: usize) -> Self {
        Self { pan, index, total }
    }
}

impl Display for PanCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[PAN#{} {}/{}]", self.pan, self.index, self.total)
    }
}
