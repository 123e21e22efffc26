//! 任务记录服务 - 业务能力层
//!
//! 只负责 jobs 文件的读写与状态流转，不关心处理过程
//!
//! ## 技术栈
//! - 任务以 JSON 字典落盘（任务 ID -> 记录），ID 用 uuid v4 生成

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::{error, warn};
use uuid::Uuid;

use crate::error::StorageError;
use crate::models::job::{JobParameters, JobRecord, JobStatus};
use crate::utils::time;

/// 任务记录服务
///
/// 职责：
/// - 为每次批处理运行创建一条任务记录
/// - 跟随运行推进状态：queued -> processing -> completed / failed
/// - 提供历史任务列表
/// - 不触发任何处理动作
pub struct JobRegistry {
    path: PathBuf,
}

impl JobRegistry {
    /// 创建指向某个 jobs 文件的服务
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 加载全部任务记录
    ///
    /// 文件不存在返回空表；内容损坏同样返回空表（历史记录不值得让运行失败）。
    pub fn load(&self) -> BTreeMap<String, JobRecord> {
        if !self.path.exists() {
            return BTreeMap::new();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                error!("读取任务记录失败: {}", e);
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("任务记录解析失败: {}", e);
                BTreeMap::new()
            }
        }
    }

    /// 创建一条新任务（状态 queued）并立即落盘
    pub fn create(
        &self,
        filename: &str,
        file_path: &str,
        parameters: JobParameters,
    ) -> Result<JobRecord, StorageError> {
        let record = JobRecord {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            file_path: file_path.to_string(),
            status: JobStatus::Queued,
            created_at: time::now_iso(),
            start_time: None,
            end_time: None,
            error: None,
            result_file: None,
            parameters,
        };

        let mut jobs = self.load();
        jobs.insert(record.id.clone(), record.clone());
        self.save(&jobs)?;
        Ok(record)
    }

    /// 标记任务开始处理
    pub fn mark_processing(&self, id: &str) -> Result<(), StorageError> {
        self.update(id, |record| {
            record.status = JobStatus::Processing;
            record.start_time = Some(time::now_iso());
        })
    }

    /// 标记任务完成
    pub fn mark_completed(&self, id: &str, result_file: &str) -> Result<(), StorageError> {
        self.update(id, |record| {
            record.status = JobStatus::Completed;
            record.end_time = Some(time::now_iso());
            record.result_file = Some(result_file.to_string());
        })
    }

    /// 标记任务失败
    pub fn mark_failed(&self, id: &str, error: &str) -> Result<(), StorageError> {
        self.update(id, |record| {
            record.status = JobStatus::Failed;
            record.end_time = Some(time::now_iso());
            record.error = Some(error.to_string());
        })
    }

    fn update(
        &self,
        id: &str,
        apply: impl FnOnce(&mut JobRecord),
    ) -> Result<(), StorageError> {
        let mut jobs = self.load();
        match jobs.get_mut(id) {
            Some(record) => apply(record),
            None => {
                warn!("⚠️ 任务 {} 不存在，跳过状态更新", id);
                return Ok(());
            }
        }
        self.save(&jobs)
    }

    fn save(&self, jobs: &BTreeMap<String, JobRecord>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(jobs)?;
        fs::write(&self.path, json).map_err(|e| StorageError::WriteFailed {
            path: self.path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_parameters() -> JobParameters {
        JobParameters {
            headless: true,
            test_mode: false,
            limit: None,
            resume: false,
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path().join("absent.json"));
        assert!(registry.load().is_empty());
    }

    #[test]
    fn test_create_and_transition() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path().join("jobs.json"));

        let job = registry
            .create("pans.xlsx", "/data/pans.xlsx", test_parameters())
            .unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.start_time.is_none());

        registry.mark_processing(&job.id).unwrap();
        let jobs = registry.load();
        assert_eq!(jobs[&job.id].status, JobStatus::Processing);
        assert!(jobs[&job.id].start_time.is_some());

        registry.mark_completed(&job.id, "/data/pans.xlsx").unwrap();
        let jobs = registry.load();
        assert_eq!(jobs[&job.id].status, JobStatus::Completed);
        assert_eq!(jobs[&job.id].result_file.as_deref(), Some("/data/pans.xlsx"));
        assert!(jobs[&job.id].end_time.is_some());
    }

    #[test]
    fn test_mark_failed_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path().join("jobs.json"));

        let job = registry
            .create("pans.xlsx", "/data/pans.xlsx", test_parameters())
            .unwrap();
        registry.mark_failed(&job.id, "浏览器启动失败").unwrap();

        let jobs = registry.load();
        assert_eq!(jobs[&job.id].status, JobStatus::Failed);
        assert_eq!(jobs[&job.id].error.as_deref(), Some("浏览器启动失败"));
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path().join("jobs.json"));
        // 不存在的任务 ID 不报错
        registry.mark_processing("ghost").unwrap();
        assert!(registry.load().is_empty());
    }
}
