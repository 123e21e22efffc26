use serde::{Deserialize, Serialize};

use crate::models::checkpoint::Checkpoint;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// 已创建，尚未开始
    Queued,
    /// 正在处理
    Processing,
    /// 已完成
    Completed,
    /// 失败
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// 任务的运行参数快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParameters {
    pub headless: bool,
    pub test_mode: bool,
    pub limit: Option<usize>,
    pub resume: bool,
}

/// 任务进度（来自断点文件）
///
/// 任务记录本身不存进度，展示时从断点文件现算。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    /// 已处理的 PAN 数量
    pub processed_count: usize,
    /// 断点保存时间
    pub timestamp: String,
}

impl JobProgress {
    /// 从断点内容推导进度，断点为空则视为没有进度
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Option<Self> {
        if checkpoint.processed_pans.is_empty() {
            return None;
        }
        Some(JobProgress {
            processed_count: checkpoint.processed_pans.len(),
            timestamp: checkpoint.timestamp.clone(),
        })
    }
}

/// 一次批处理运行的记录
///
/// 持久化在 jobs 文件中，跨进程查询历史运行情况。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// 任务 ID（UUID）
    pub id: String,
    /// 输入文件名
    pub filename: String,
    /// 输入文件完整路径
    pub file_path: String,
    /// 当前状态
    pub status: JobStatus,
    /// 创建时间（ISO-8601）
    pub created_at: String,
    /// 开始处理时间
    #[serde(default)]
    pub start_time: Option<String>,
    /// 结束时间（完成或失败）
    #[serde(default)]
    pub end_time: Option<String>,
    /// 失败原因
    #[serde(default)]
    pub error: Option<String>,
    /// 结果文件路径（处理完成后与输入文件相同）
    #[serde(default)]
    pub result_file: Option<String>,
    /// 运行参数
    pub parameters: JobParameters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            r#""processing""#
        );
        let parsed: JobStatus = serde_json::from_str(r#""failed""#).unwrap();
        assert_eq!(parsed, JobStatus::Failed);
    }

    #[test]
    fn test_progress_derived_from_checkpoint() {
        let mut checkpoint = Checkpoint::default();
        assert!(JobProgress::from_checkpoint(&checkpoint).is_none());

        checkpoint.processed_pans.push("AAAAA1111A".to_string());
        checkpoint.timestamp = "2025-01-01T00:00:00.000000".to_string();
        let progress = JobProgress::from_checkpoint(&checkpoint).unwrap();
        assert_eq!(progress.processed_count, 1);
        assert_eq!(progress.timestamp, "2025-01-01T00:00:00.000000");
    }

    #[test]
    fn test_job_record_tolerates_missing_optionals() {
        let json = r#"{
            "id": "abc",
            "filename": "pans.xlsx",
            "file_path": "/tmp/pans.xlsx",
            "status": "queued",
            "created_at": "2025-01-01T00:00:00.000000",
            "parameters": {"headless": true, "test_mode": false, "limit": null, "resume": false}
        }"#;
        let record: JobRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.status, JobStatus::Queued);
        assert!(record.start_time.is_none());
        assert!(record.error.is_none());
    }
}
