//! PAN 搜索流程 - 流程层
//!
//! 核心职责：定义"一个 PAN"的完整查询流程
//!
//! 流程顺序：
//! 1. 填入 PAN → 验证码流程
//! 2. 等结果页稳定 → 整页截图备查
//! 3. 提取结果表中的 {GSTIN, 状态, 州} 行

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::PortalError;
use crate::infrastructure::PortalPage;
use crate::models::LookupResult;
use crate::utils::time::unix_ts;
use crate::workflow::captcha_flow::{CaptchaFlow, CaptchaState};
use crate::workflow::pan_ctx::PanCtx;

/// PAN 输入框
const PAN_INPUT: &str = "#for_gstin";
/// 结果表（门户的专用表格类名）
const RESULTS_TABLE: &str = "table.table.tbl.inv.exp.table-bordered.ng-table";
/// 结果表的宽松兜底选择器
const RESULTS_TABLE_FALLBACK: &str = "table.table";
/// 无记录提示文本
const NO_RECORDS_MARKER: &str = "No records found";
/// GSTIN 固定长度
const GSTIN_LEN: usize = 15;

/// 输入框等待超时
const INPUT_WAIT_SECS: u64 = 10;
/// 结果表等待超时
const TABLE_WAIT_SECS: u64 = 10;
/// 进入结果页后的固定等待
const RESULTS_SETTLE_SECS: u64 = 5;

/// JS 提取脚本的返回结构
#[derive(Debug, Deserialize)]
struct ExtractionPayload {
    table_count: usize,
    rows: Vec<ExtractedRow>,
}

#[derive(Debug, Deserialize)]
struct ExtractedRow {
    gstin: String,
    status: String,
    state: String,
}

/// PAN 搜索流程
///
/// 职责：
/// - 编排单个 PAN 的"填表 → 验证码 → 提取"流程
/// - 把所有失败都折叠成结果哨兵，不向上抛
/// - 不持有 page 资源
/// - 不关心批次、断点和 Excel
pub struct SearchFlow {
    captcha_flow: CaptchaFlow,
    screenshot_dir: PathBuf,
    verbose_logging: bool,
}

impl SearchFlow {
    /// 创建新的 PAN 搜索流程
    pub fn new(config: &Config) -> Self {
        Self {
            captcha_flow: CaptchaFlow::new(config),
            screenshot_dir: PathBuf::from(&config.screenshot_dir),
            verbose_logging: config.verbose_logging,
        }
    }

    /// 查询单个 PAN 名下的 GSTIN 列表
    ///
    /// # 返回
    /// 至少一条结果：GSTIN 行、无记录哨兵或错误哨兵
    pub async fn run(&self, portal: &PortalPage, ctx: &PanCtx) -> Result<Vec<LookupResult>> {
        let pan_input = portal.wait_for_element(PAN_INPUT, INPUT_WAIT_SECS).await?;
        portal.clear_value(PAN_INPUT).await?;
        pan_input.click().await.map_err(PortalError::from)?;
        pan_input
            .type_str(&ctx.pan)
            .await
            .map_err(PortalError::from)?;
        info!("{} ✓ 已填入 PAN", ctx);

        info!("{} 开始验证码处理...", ctx);
        if self.captcha_flow.run(portal).await != CaptchaState::ResultsReady {
            error!("{} ❌ 验证码处理失败", ctx);
            return Ok(vec![LookupResult::Error {
                message: "Failed to solve captcha".to_string(),
            }]);
        }

        sleep(Duration::from_secs(RESULTS_SETTLE_SECS)).await;

        // 整页截图备查，失败不影响提取
        let screenshot_path = self
            .screenshot_dir
            .join(format!("results_page_{}_{}.png", ctx.pan, unix_ts()));
        match portal.save_screenshot(&screenshot_path).await {
            Ok(()) => info!("{} 💾 结果页截图: {}", ctx, screenshot_path.display()),
            Err(e) => warn!("{} ⚠️ 结果页截图失败: {}", ctx, e),
        }

        Ok(self.extract_results(portal, ctx).await)
    }

    /// 提取结果页上的 GSTIN 行
    ///
    /// 任何失败都折叠成错误哨兵返回，由调和阶段落到 PAN 状态上。
    async fn extract_results(&self, portal: &PortalPage, ctx: &PanCtx) -> Vec<LookupResult> {
        // 无记录提示短路，不再解析表格
        match portal.page_source_contains(NO_RECORDS_MARKER).await {
            Ok(true) => {
                info!("{} 门户提示无记录", ctx);
                return vec![LookupResult::NoRecords];
            }
            Ok(false) => {}
            Err(e) => {
                error!("{} ❌ 读取页面源码失败: {}", ctx, e);
                return vec![LookupResult::Error {
                    message: e.to_string(),
                }];
            }
        }

        if let Err(e) = portal.wait_for_element(RESULTS_TABLE, TABLE_WAIT_SECS).await {
            warn!("{} ⚠️ 结果表未出现: {}", ctx, e);
            return vec![LookupResult::Error {
                message: "Results table not found".to_string(),
            }];
        }

        let payload: ExtractionPayload = match self.eval_extraction(portal).await {
            Ok(payload) => payload,
            Err(e) => {
                error!("{} ❌ 提取结果失败: {}", ctx, e);
                return vec![LookupResult::Error {
                    message: e.to_string(),
                }];
            }
        };

        if payload.table_count == 0 {
            warn!("{} ⚠️ 页面上没有找到表格", ctx);
            return vec![LookupResult::Error {
                message: "No tables found on the page".to_string(),
            }];
        }
        info!("{} 找到 {} 个结果表", ctx, payload.table_count);

        if payload.rows.is_empty() {
            warn!("{} ⚠️ 表格中没有提取到任何行", ctx);
            return vec![LookupResult::Error {
                message: "No results extracted".to_string(),
            }];
        }

        // 详细日志（如果启用）
        if self.verbose_logging {
            self.log_extracted_rows(ctx, &payload.rows);
        }

        let mut results = Vec::with_capacity(payload.rows.len());
        for row in payload.rows {
            // 长度异常的 GSTIN 也照常保留，只记一条警告
            if row.gstin.len() != GSTIN_LEN {
                warn!("{} ⚠️ GSTIN 格式异常: {}", ctx, row.gstin);
            }
            info!("{} ✓ GSTIN={}", ctx, row.gstin);
            results.push(LookupResult::Gstin {
                gstin: row.gstin,
                status: row.status,
                state: row.state,
            });
        }
        info!("{} ✅ 共提取 {} 条结果", ctx, results.len());
        results
    }

    /// 逐行打印提取到的结果（详细日志模式）
    fn log_extracted_rows(&self, ctx: &PanCtx, rows: &[ExtractedRow]) {
        for (i, row) in rows.iter().enumerate() {
            info!(
                "{}   {}. GSTIN={} 状态={} 州={}",
                ctx,
                i + 1,
                row.gstin,
                row.status,
                row.state
            );
        }
    }

    /// 在页面里执行提取脚本
    ///
    /// 先用门户的专用表格类名，找不到再退回宽松选择器。
    /// 行布局固定：第 2/3/4 列是 GSTIN / 状态 / 州。
    async fn eval_extraction(&self, portal: &PortalPage) -> Result<ExtractionPayload> {
        let js = format!(
            r#"(() => {{
                let tables = Array.from(document.querySelectorAll('{specific}'));
                if (tables.length === 0) {{
                    tables = Array.from(document.querySelectorAll('{fallback}'));
                }}
                const rows = [];
                for (const table of tables) {{
                    for (const tr of table.querySelectorAll('tbody tr')) {{
                        const cells = tr.querySelectorAll('td');
                        if (cells.length >= 4) {{
                            rows.push({{
                                gstin: cells[1].innerText.trim(),
                                status: cells[2].innerText.trim(),
                                state: cells[3].innerText.trim(),
                            }});
                        }}
                    }}
                }}
                return {{ table_count: tables.length, rows: rows }};
            }})()"#,
            specific = RESULTS_TABLE,
            fallback = RESULTS_TABLE_FALLBACK,
        );
        portal.eval_as(js).await
    }
}
