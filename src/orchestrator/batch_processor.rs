//! 批量 PAN 处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是批量查询的入口，负责 PAN 工作列表的推进和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：校验 Excel、加载断点、计算工作列表
//! 2. **资源管理**：唯一持有 BrowserHandle，会话失效时重启
//! 3. **逐个处理**：把单个 PAN 委托给 workflow::SearchFlow
//! 4. **批次落盘**：每满一批（或到队尾）保存一次断点
//! 5. **限速**：相邻 PAN 之间随机延迟，避免压垮门户
//! 6. **全量调和**：跑完后一次性把结果写回 Excel
//!
//! ## 设计特点
//!
//! - **失败即数据**：单个 PAN 的失败折叠成错误哨兵，绝不中断批次
//! - **一次重写**：Excel 只在调和阶段被重写一次
//! - **断点优先**：断点文件是续跑时唯一的事实来源

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::browser::BrowserHandle;
use crate::config::{Config, RunOptions};
use crate::infrastructure::PortalPage;
use crate::models::{GstinRow, LookupResult, PanRow, PanStatus};
use crate::services::{CheckpointLedger, SpreadsheetStore};
use crate::utils::logging;
use crate::workflow::{PanCtx, SearchFlow};

/// 搜索表单输入框
const PAN_INPUT: &str = "#for_gstin";
/// 首次打开门户的页面加载等待
const PAGE_LOAD_WAIT_SECS: u64 = 20;
/// 刷新后的固定等待
const RECOVER_SETTLE_SECS: u64 = 2;

/// 批次游标
///
/// 每处理完一个 PAN 调一次 `advance`，满一批或到队尾时返回 true，
/// 由调用方触发断点保存。
#[derive(Debug)]
pub struct BatchCursor {
    batch_size: usize,
    count: usize,
}

impl BatchCursor {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            count: 0,
        }
    }

    /// 记录一个处理完的 PAN
    ///
    /// # 返回
    /// 是否应该保存断点
    pub fn advance(&mut self, is_last: bool) -> bool {
        self.count += 1;
        if self.count >= self.batch_size || is_last {
            self.count = 0;
            true
        } else {
            false
        }
    }
}

/// 计算本次要处理的 PAN 列表
///
/// 依次应用：断点过滤 → 测试模式截断 → 数量上限，保持原有顺序。
pub fn build_work_list(
    pan_numbers: &[String],
    processed: &[String],
    test_mode: bool,
    limit: Option<usize>,
) -> Vec<String> {
    let processed_set: HashSet<&str> = processed.iter().map(String::as_str).collect();
    let mut work_list: Vec<String> = pan_numbers
        .iter()
        .filter(|pan| !processed_set.contains(pan.as_str()))
        .cloned()
        .collect();

    if test_mode && work_list.len() > 1 {
        info!("🧪 测试模式: 只处理第一个 PAN {}", work_list[0]);
        work_list.truncate(1);
    }

    if let Some(limit) = limit {
        if work_list.len() > limit {
            info!(
                "✂️ 限制处理数量: 前 {} 个（共 {} 个待处理）",
                limit,
                work_list.len()
            );
            work_list.truncate(limit);
        }
    }

    work_list
}

/// 应用主结构
pub struct App {
    config: Config,
    options: RunOptions,
    store: SpreadsheetStore,
    ledger: CheckpointLedger,
    search_flow: SearchFlow,
    pan_rows: Vec<PanRow>,
    gstin_rows: Vec<GstinRow>,
    work_list: Vec<String>,
    processed_pans: Vec<String>,
    results: BTreeMap<String, Vec<LookupResult>>,
}

impl App {
    /// 初始化应用
    ///
    /// 校验失败（文件缺失、没有 PAN 列等）在这里直接报错，
    /// 不会走到浏览器阶段。
    pub async fn initialize(config: Config, options: RunOptions) -> Result<Self> {
        logging::init_log_file(&config.output_log_file)?;
        logging::log_startup(&options.excel_file, options.headless);
        if options.test_mode {
            info!("🧪 测试模式: 只处理一个 PAN，输出详细日志");
        }

        let store = SpreadsheetStore::new(&options.excel_file);
        let (pan_rows, gstin_rows) = store.validate_and_load()?;

        let (pan_numbers, _) = SpreadsheetStore::extract_pan_numbers(&pan_rows);
        if pan_numbers.is_empty() {
            bail!("文件 {} 中没有有效的 PAN 号码", options.excel_file);
        }

        let ledger = CheckpointLedger::new(&config.checkpoint_file);
        let (processed_pans, results) = if options.resume {
            let checkpoint = ledger.load();
            (checkpoint.processed_pans, checkpoint.results)
        } else {
            (Vec::new(), BTreeMap::new())
        };

        let work_list = build_work_list(
            &pan_numbers,
            &processed_pans,
            options.test_mode,
            options.limit,
        );
        logging::log_pans_loaded(work_list.len(), processed_pans.len(), config.batch_size);

        let search_flow = SearchFlow::new(&config);

        Ok(Self {
            config,
            options,
            store,
            ledger,
            search_flow,
            pan_rows,
            gstin_rows,
            work_list,
            processed_pans,
            results,
        })
    }

    /// 运行批量查询主循环
    pub async fn run(mut self) -> Result<()> {
        if self.work_list.is_empty() {
            info!("没有需要处理的 PAN，全部已在断点中");
            // 断点里已有的结果也要调和进 Excel
            if !self.results.is_empty() {
                self.store
                    .reconcile(&mut self.pan_rows, &mut self.gstin_rows, &self.results)?;
            }
            return Ok(());
        }

        let total = self.work_list.len();
        info!("开始处理 {} 个 PAN", total);

        let mut handle =
            BrowserHandle::launch(self.options.headless, &self.config.portal_search_url).await?;
        {
            let portal = PortalPage::new(handle.page().clone());
            portal
                .wait_for_element(PAN_INPUT, PAGE_LOAD_WAIT_SECS)
                .await?;
        }
        info!("✓ 已打开 GST 门户搜索页");

        let mut cursor = BatchCursor::new(self.config.batch_size);
        let mut success = 0usize;
        let mut failed = 0usize;

        let work_list = std::mem::take(&mut self.work_list);
        for (i, pan) in work_list.iter().enumerate() {
            let ctx = PanCtx::new(pan.clone(), i + 1, total);
            info!("\n{} 开始处理", ctx);

            // 会话探活，失效就重启浏览器
            if !handle.is_alive().await {
                if let Err(e) = handle.restart(&self.config.portal_search_url).await {
                    error!("{} ❌ 浏览器重启失败，提前结束本次运行: {}", ctx, e);
                    break;
                }
            }
            let portal = PortalPage::new(handle.page().clone());

            let results = match self.search_flow.run(&portal, &ctx).await {
                Ok(results) => results,
                Err(e) => {
                    error!("{} ❌ 处理出错: {}", ctx, e);
                    let sentinel = vec![LookupResult::Error {
                        message: e.to_string(),
                    }];

                    // 刷新自救，刷不动就重启浏览器
                    let recovered = match portal.refresh().await {
                        Ok(()) => {
                            sleep(Duration::from_secs(RECOVER_SETTLE_SECS)).await;
                            true
                        }
                        Err(_) => handle
                            .restart(&self.config.portal_search_url)
                            .await
                            .is_ok(),
                    };
                    if !recovered {
                        error!("{} ❌ 页面和浏览器都无法恢复，提前结束本次运行", ctx);
                        self.record(pan, sentinel);
                        failed += 1;
                        break;
                    }
                    sentinel
                }
            };

            let (_, status) = PanStatus::derive(&results);
            if matches!(status, PanStatus::Error(_)) {
                failed += 1;
            } else {
                success += 1;
            }
            self.record(pan, results);

            // 批次落盘
            let is_last = i + 1 == total;
            if cursor.advance(is_last) {
                log_batch_saved(i + 1, total);
                if let Err(e) = self.ledger.save(&self.processed_pans, &self.results) {
                    warn!("⚠️ 断点保存失败: {}", e);
                }
            }

            if !is_last {
                // 随机限速，避免触发门户风控
                let delay = self.config.delay_min_secs
                    + rand::random::<f64>()
                        * (self.config.delay_max_secs - self.config.delay_min_secs);
                sleep(Duration::from_secs_f64(delay)).await;

                // 刷新回到搜索表单
                if let Err(e) = portal.refresh().await {
                    warn!("{} ⚠️ 刷新页面失败: {}", ctx, e);
                }
                sleep(Duration::from_secs(RECOVER_SETTLE_SECS)).await;
            }
        }

        handle.shutdown().await;

        // 全量调和写回 Excel，这是 Excel 唯一被重写的地方
        self.store
            .reconcile(&mut self.pan_rows, &mut self.gstin_rows, &self.results)?;

        logging::print_final_stats(success, failed, total, &self.config.output_log_file);
        Ok(())
    }

    /// 输入文件路径
    pub fn excel_file(&self) -> &str {
        &self.options.excel_file
    }

    fn record(&mut self, pan: &str, results: Vec<LookupResult>) {
        self.results.insert(pan.to_string(), results);
        self.processed_pans.push(pan.to_string());
    }
}

// ========== 日志辅助函数 ==========

fn log_batch_saved(done: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("💾 进度 {}/{}，保存断点", done, total);
    info!("{}", "─".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pans(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_work_list_filters_processed() {
        let all = pans(&["AAAAA0000A", "BBBBB1111B", "CCCCC2222C"]);
        let processed = pans(&["BBBBB1111B"]);
        let work = build_work_list(&all, &processed, false, None);
        assert_eq!(work, pans(&["AAAAA0000A", "CCCCC2222C"]));
    }

    #[test]
    fn test_build_work_list_keeps_order() {
        let all = pans(&["CCCCC2222C", "AAAAA0000A", "BBBBB1111B"]);
        let work = build_work_list(&all, &[], false, None);
        assert_eq!(work, all);
    }

    #[test]
    fn test_build_work_list_test_mode_truncates_to_one() {
        let all = pans(&["AAAAA0000A", "BBBBB1111B", "CCCCC2222C"]);
        let work = build_work_list(&all, &[], true, None);
        assert_eq!(work, pans(&["AAAAA0000A"]));
    }

    #[test]
    fn test_build_work_list_applies_limit() {
        let all = pans(&["AAAAA0000A", "BBBBB1111B", "CCCCC2222C"]);
        let work = build_work_list(&all, &[], false, Some(2));
        assert_eq!(work, pans(&["AAAAA0000A", "BBBBB1111B"]));
    }

    #[test]
    fn test_build_work_list_resume_then_limit() {
        let all = pans(&["AAAAA0000A", "BBBBB1111B", "CCCCC2222C", "DDDDD3333D"]);
        let processed = pans(&["AAAAA0000A"]);
        let work = build_work_list(&all, &processed, false, Some(2));
        assert_eq!(work, pans(&["BBBBB1111B", "CCCCC2222C"]));
    }

    #[test]
    fn test_batch_cursor_saves_at_boundaries() {
        // 25 个、每批 10 个：第 10、20、25 个之后各保存一次
        let mut cursor = BatchCursor::new(10);
        let mut save_points = Vec::new();
        for i in 1..=25 {
            if cursor.advance(i == 25) {
                save_points.push(i);
            }
        }
        assert_eq!(save_points, vec![10, 20, 25]);
    }

    #[test]
    fn test_batch_cursor_exact_multiple_saves_once_at_end() {
        let mut cursor = BatchCursor::new(5);
        let mut saves = 0;
        for i in 1..=10 {
            if cursor.advance(i == 10) {
                saves += 1;
            }
        }
        assert_eq!(saves, 2);
    }

    #[test]
    fn test_batch_cursor_clamps_zero_batch_size() {
        let mut cursor = BatchCursor::new(0);
        assert!(cursor.advance(false));
    }
}
