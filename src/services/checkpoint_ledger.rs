//! 断点服务 - 业务能力层
//!
//! 只负责断点文件的读写，不关心批次划分
//!
//! ## 技术栈
//! - 断点以 JSON 落盘（serde_json，带缩进方便人工检查）

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::{error, info};

use crate::error::StorageError;
use crate::models::checkpoint::Checkpoint;
use crate::models::gstin::LookupResult;
use crate::utils::time;

/// 断点服务
///
/// 职责：
/// - 加载上次运行的断点（任何失败都退化为"从头开始"，不打断运行）
/// - 周期性保存已处理的 PAN 与结果
/// - 不决定何时保存（由编排层按批次触发）
pub struct CheckpointLedger {
    path: PathBuf,
}

impl CheckpointLedger {
    /// 创建指向某个断点文件的服务
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 加载断点
    ///
    /// 文件不存在或内容损坏都返回空断点，本次运行从头开始。
    pub fn load(&self) -> Checkpoint {
        if !self.path.exists() {
            info!("未找到断点文件，从头开始");
            return Checkpoint::default();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                error!("读取断点文件失败: {}", e);
                return Checkpoint::default();
            }
        };

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                info!(
                    "✓ 加载断点: {} 个已处理的 PAN",
                    checkpoint.processed_pans.len()
                );
                checkpoint
            }
            Err(e) => {
                error!("断点文件解析失败: {}", e);
                Checkpoint::default()
            }
        }
    }

    /// 保存断点
    ///
    /// 时间戳在保存时生成；保存失败由调用方决定是否继续。
    pub fn save(
        &self,
        processed_pans: &[String],
        results: &BTreeMap<String, Vec<LookupResult>>,
    ) -> Result<(), StorageError> {
        let checkpoint = Checkpoint {
            processed_pans: processed_pans.to_vec(),
            results: results.clone(),
            timestamp: time::now_iso(),
        };

        let json = serde_json::to_string_pretty(&checkpoint)?;
        fs::write(&self.path, json).map_err(|e| StorageError::WriteFailed {
            path: self.path.display().to_string(),
            source: e,
        })?;

        info!("💾 已保存断点: {} 个已处理的 PAN", processed_pans.len());
        Ok(())
    }
}
