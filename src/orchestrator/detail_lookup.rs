//! GSTIN 详情查询 - 编排层
//!
//! 单次查询的资源编排：起浏览器 → 跑详情流程 → 关浏览器。
//! 详情查询和批量查询互不影响，各自持有独立的浏览器实例。

use anyhow::{bail, Result};
use tracing::info;

use crate::browser::BrowserHandle;
use crate::config::Config;
use crate::infrastructure::PortalPage;
use crate::models::GstinDetails;
use crate::workflow::DetailFlow;

/// 详情搜索表单输入框
const GSTIN_INPUT: &str = "#for_gstin";
/// 首次打开门户的页面加载等待
const PAGE_LOAD_WAIT_SECS: u64 = 20;
/// GSTIN 固定长度
const GSTIN_LEN: usize = 15;

/// 查询单个 GSTIN 的工商详情
///
/// 详情查询总是无头跑，浏览器在所有出口都会被关闭。
pub async fn lookup_gstin_details(config: &Config, gstin: &str) -> Result<GstinDetails> {
    let gstin = gstin.trim().to_uppercase();
    if gstin.len() != GSTIN_LEN {
        bail!("GSTIN 格式不正确: {} (应为 {} 位)", gstin, GSTIN_LEN);
    }

    info!("🔍 查询 GSTIN 详情: {}", gstin);

    let handle = BrowserHandle::launch(true, &config.portal_details_url).await?;
    let portal = PortalPage::new(handle.page().clone());
    let flow = DetailFlow::new(config);

    let outcome = async {
        portal
            .wait_for_element(GSTIN_INPUT, PAGE_LOAD_WAIT_SECS)
            .await?;
        info!("✓ 已打开 GST 门户详情搜索页");
        flow.run(&portal, &gstin).await
    }
    .await;

    handle.shutdown().await;
    outcome
}
