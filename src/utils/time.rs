//! 时间工具模块
//!
//! 断点文件、Excel 的 Last_Updated 列和备份文件名共用这里的格式，
//! 避免同一批数据出现多种时间写法。

use chrono::Local;

/// ISO-8601 格式时间戳（断点文件与 Last_Updated 列）
pub fn now_iso() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// 用于日志显示的时间
pub fn now_display() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// 备份文件名中的紧凑时间戳
pub fn now_compact() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Unix 秒级时间戳（截图文件名）
pub fn unix_ts() -> i64 {
    Local::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_iso_format() {
        let ts = now_iso();
        // 形如 2025-01-01T12:00:00.123456
        assert_eq!(ts.len(), 26);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[19..20], ".");
    }

    #[test]
    fn test_now_compact_format() {
        let ts = now_compact();
        assert_eq!(ts.len(), 15);
        assert_eq!(&ts[8..9], "_");
        assert!(ts.replace('_', "").chars().all(|c| c.is_ascii_digit()));
    }
}
