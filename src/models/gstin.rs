use serde::{Deserialize, Serialize};

/// 门户搜索返回的单条结果
///
/// 按 kind 字段做外部标签，断点文件里可以直接看出每条是什么。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LookupResult {
    /// 一条 GSTIN 记录
    Gstin {
        gstin: String,
        status: String,
        state: String,
    },
    /// 门户明确返回 "No records found"
    NoRecords,
    /// 处理该 PAN 时出错
    Error { message: String },
}

/// GSTIN_Data 表的一行
#[derive(Debug, Clone, Default)]
pub struct GstinRow {
    /// 关联的 PAN
    pub pan_reference: String,
    /// GSTIN 号码
    pub gstin: String,
    /// 注册状态（Active / Cancelled 等）
    pub gstin_status: String,
    /// 所属邦
    pub state: String,
    /// 商号（详情查询补充）
    pub trade_name: String,
    /// 注册日期（详情查询补充）
    pub registration_date: String,
    /// HSN 编码，逗号分隔（详情查询补充）
    pub hsn_codes: String,
    /// 最近一次更新时间（ISO-8601）
    pub last_updated: String,
}

/// 单个 GSTIN 的详情查询结果
#[derive(Debug, Clone, Default)]
pub struct GstinDetails {
    /// GSTIN 号码
    pub gstin: String,
    /// 商号
    pub trade_name: String,
    /// 注册日期
    pub registration_date: String,
    /// HSN 编码列表（已去重）
    pub hsn_codes: Vec<String>,
}
