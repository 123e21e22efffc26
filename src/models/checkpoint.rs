use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::gstin::LookupResult;

/// 断点文件内容
///
/// 每处理一批 PAN 落盘一次，崩溃后用 --resume 从这里继续。
/// 字段都带 default，旧版本或手工编辑过的文件也能读。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// 已处理完成的 PAN（按处理顺序）
    #[serde(default)]
    pub processed_pans: Vec<String>,

    /// PAN -> 查询结果
    #[serde(default)]
    pub results: BTreeMap<String, Vec<LookupResult>>,

    /// 最近一次保存时间（ISO-8601）
    #[serde(default)]
    pub timestamp: String,
}

impl Checkpoint {
    /// 断点中是否已有该 PAN
    pub fn contains(&self, pan: &str) -> bool {
        self.processed_pans.iter().any(|p| p == pan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_tolerates_missing_fields() {
        let parsed: Checkpoint = serde_json::from_str("{}").unwrap();
        assert!(parsed.processed_pans.is_empty());
        assert!(parsed.results.is_empty());
        assert!(parsed.timestamp.is_empty());
    }

    #[test]
    fn test_checkpoint_contains() {
        let checkpoint = Checkpoint {
            processed_pans: vec!["ABCDE1234F".to_string()],
            ..Default::default()
        };
        assert!(checkpoint.contains("ABCDE1234F"));
        assert!(!checkpoint.contains("FGHIJ5678K"));
    }
}
