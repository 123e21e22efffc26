//! GSTIN 详情流程 - 流程层
//!
//! 核心职责：在详情搜索页查出单个 GSTIN 的工商信息
//!
//! 流程顺序：
//! 1. 填入 GSTIN → 验证码流程
//! 2. 等结果页稳定 → 整页截图备查
//! 3. 提取商号 / 注册日期 / HSN 编码（字段级宽松，缺哪个记哪个）

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::PortalError;
use crate::infrastructure::PortalPage;
use crate::models::GstinDetails;
use crate::utils::time::unix_ts;
use crate::workflow::captcha_flow::{CaptchaFlow, CaptchaState};

/// GSTIN 输入框（和 PAN 搜索页同名）
const GSTIN_INPUT: &str = "#for_gstin";
/// 无记录提示文本
const NO_RECORDS_MARKER: &str = "No records found";

/// 输入框等待超时
const INPUT_WAIT_SECS: u64 = 10;
/// 进入结果页后的固定等待
const RESULTS_SETTLE_SECS: u64 = 5;

/// JS 提取脚本的返回结构
#[derive(Debug, Deserialize)]
struct DetailPayload {
    trade_name: Option<String>,
    registration_date: Option<String>,
    hsn_codes: Vec<String>,
}

/// GSTIN 详情流程
///
/// 职责：
/// - 编排单个 GSTIN 的"填表 → 验证码 → 提取详情"流程
/// - 字段提取失败只降级记录，不中断流程
/// - 不持有 page 资源
/// - 不负责把详情写回 Excel
pub struct DetailFlow {
    captcha_flow: CaptchaFlow,
    screenshot_dir: PathBuf,
}

impl DetailFlow {
    /// 创建新的 GSTIN 详情流程
    pub fn new(config: &Config) -> Self {
        Self {
            captcha_flow: CaptchaFlow::new(config),
            screenshot_dir: PathBuf::from(&config.screenshot_dir),
        }
    }

    /// 查询单个 GSTIN 的详情
    ///
    /// # 返回
    /// 验证码失败或门户查无此号时返回错误，字段缺失不算失败
    pub async fn run(&self, portal: &PortalPage, gstin: &str) -> Result<GstinDetails> {
        let gstin_input = portal
            .wait_for_element(GSTIN_INPUT, INPUT_WAIT_SECS)
            .await?;
        portal.clear_value(GSTIN_INPUT).await?;
        gstin_input.click().await.map_err(PortalError::from)?;
        gstin_input
            .type_str(gstin)
            .await
            .map_err(PortalError::from)?;
        info!("✓ 已填入 GSTIN: {}", gstin);

        info!("开始验证码处理...");
        if self.captcha_flow.run(portal).await != CaptchaState::ResultsReady {
            bail!("GSTIN {} 的验证码处理失败", gstin);
        }

        sleep(Duration::from_secs(RESULTS_SETTLE_SECS)).await;

        let screenshot_path = self
            .screenshot_dir
            .join(format!("gstin_details_{}_{}.png", gstin, unix_ts()));
        match portal.save_screenshot(&screenshot_path).await {
            Ok(()) => info!("💾 详情页截图: {}", screenshot_path.display()),
            Err(e) => warn!("⚠️ 详情页截图失败: {}", e),
        }

        if portal.page_source_contains(NO_RECORDS_MARKER).await? {
            bail!("门户查无 GSTIN {}", gstin);
        }

        let payload: DetailPayload = self.eval_extraction(portal).await?;

        let mut details = GstinDetails {
            gstin: gstin.to_string(),
            trade_name: String::new(),
            registration_date: String::new(),
            hsn_codes: Vec::new(),
        };

        match payload.trade_name {
            Some(name) if !name.is_empty() => {
                info!("✓ 商号: {}", name);
                details.trade_name = name;
            }
            _ => warn!("⚠️ 未提取到商号"),
        }
        match payload.registration_date {
            Some(date) if !date.is_empty() => {
                info!("✓ 注册日期: {}", date);
                details.registration_date = date;
            }
            _ => warn!("⚠️ 未提取到注册日期"),
        }
        if payload.hsn_codes.is_empty() {
            warn!("⚠️ 未提取到 HSN 编码");
        } else {
            info!("✓ HSN 编码: {:?}", payload.hsn_codes);
            details.hsn_codes = payload.hsn_codes;
        }

        Ok(details)
    }

    /// 在详情页里执行提取脚本
    ///
    /// 商号和注册日期取标签单元格的右邻单元格；HSN 先按同样方式收集，
    /// 一个都没有时退回"带 HSN 表头的表格取每行第一列"。
    async fn eval_extraction(&self, portal: &PortalPage) -> Result<DetailPayload> {
        let js = r#"(() => {
            const sibling = (label) => {
                for (const td of document.querySelectorAll('td')) {
                    if (td.innerText && td.innerText.includes(label)) {
                        const next = td.nextElementSibling;
                        if (next && next.tagName === 'TD') {
                            return next.innerText.trim();
                        }
                    }
                }
                return null;
            };

            const hsn = [];
            for (const td of document.querySelectorAll('td')) {
                if (td.innerText && td.innerText.includes('HSN')) {
                    const next = td.nextElementSibling;
                    if (next && next.tagName === 'TD') {
                        const code = next.innerText.trim();
                        if (code && !hsn.includes(code)) {
                            hsn.push(code);
                        }
                    }
                }
            }
            if (hsn.length === 0) {
                for (const table of document.querySelectorAll('table')) {
                    if (!table.className.includes('table')) continue;
                    const ths = Array.from(table.querySelectorAll('th'));
                    if (!ths.some(th => th.innerText && th.innerText.includes('HSN'))) continue;
                    for (const row of Array.from(table.querySelectorAll('tr')).slice(1)) {
                        const cell = row.querySelector('td');
                        if (cell) {
                            const code = cell.innerText.trim();
                            if (code && !hsn.includes(code)) {
                                hsn.push(code);
                            }
                        }
                    }
                    break;
                }
            }

            return {
                trade_name: sibling('Trade Name'),
                registration_date: sibling('Date of Registration'),
                hsn_codes: hsn,
            };
        })()"#;
        portal.eval_as(js).await
    }
}
