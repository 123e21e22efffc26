use regex::Regex;

use crate::models::gstin::LookupResult;

/// PAN 格式：5 个大写字母 + 4 个数字 + 1 个大写字母
pub const PAN_PATTERN: &str = r"^[A-Z]{5}[0-9]{4}[A-Z]$";

/// 校验 PAN 格式
///
/// 输入需要先做 trim + 大写归一，这里只负责模式匹配。
pub fn is_valid_pan(pan: &str) -> bool {
    Regex::new(PAN_PATTERN)
        .map(|re| re.is_match(pan))
        .unwrap_or(false)
}

/// PAN_Data 表的一行
///
/// 所有字段按表格原样保存为字符串，写回时不丢失用户手填的内容。
#[derive(Debug, Clone, Default)]
pub struct PanRow {
    /// PAN 号码
    pub pan: String,
    /// 持有人姓名
    pub name: String,
    /// 邮箱
    pub email: String,
    /// 电话
    pub phone: String,
    /// 地址
    pub address: String,
    /// 关联到的 GSTIN 数量
    pub gstin_count: String,
    /// 最近一次更新时间（ISO-8601）
    pub last_updated: String,
    /// 处理状态
    pub status: String,
}

/// 单个 PAN 的处理结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanStatus {
    /// 至少找到一个有效 GSTIN
    Success,
    /// 门户明确返回无记录
    NoResultsFound,
    /// 处理过程中出错（保留第一条错误信息）
    Error(String),
    /// 结果列表非空但不属于以上任何一类
    Unknown,
}

impl PanStatus {
    /// 从查询结果推导状态
    ///
    /// # 返回
    /// (有效 GSTIN 数量, 状态)
    ///
    /// 优先级：找到有效 GSTIN > 无记录 > 错误 > 未知。
    pub fn derive(results: &[LookupResult]) -> (usize, PanStatus) {
        let count = results
            .iter()
            .filter(|r| matches!(r, LookupResult::Gstin { gstin, .. } if gstin.len() == 15))
            .count();

        if count > 0 {
            return (count, PanStatus::Success);
        }
        if results
            .iter()
            .any(|r| matches!(r, LookupResult::NoRecords))
        {
            return (0, PanStatus::NoResultsFound);
        }
        for result in results {
            if let LookupResult::Error { message } = result {
                return (0, PanStatus::Error(message.clone()));
            }
        }
        (0, PanStatus::Unknown)
    }
}

impl std::fmt::Display for PanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PanStatus::Success => write!(f, "Success"),
            PanStatus::NoResultsFound => write!(f, "No GSTINs found"),
            PanStatus::Error(message) => write!(f, "Error: {}", message),
            PanStatus::Unknown => write!(f, "Unknown"),
        }
    }
}
