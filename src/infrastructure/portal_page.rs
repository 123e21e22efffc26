//! 门户页面 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS / 等元素 / 截图"这类能力

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Element, Page};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::time::sleep;

use crate::error::PortalError;

/// 元素轮询间隔
const POLL_INTERVAL_MS: u64 = 250;

/// 门户页面
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() / 等待元素 / 截图 / 刷新能力
/// - 不认识 PAN / GSTIN
/// - 不处理业务流程
pub struct PortalPage {
    page: Page,
}

impl PortalPage {
    /// 创建新的门户页面
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于元素级操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    ///
    /// # 参数
    /// - `js_code`: 要执行的 JavaScript 代码
    ///
    /// # 返回
    /// 返回 JSON 值
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue> {
        let result = self
            .page
            .evaluate(js_code.into())
            .await
            .map_err(PortalError::from)?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> Result<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 等待元素出现
    ///
    /// 每 250ms 轮询一次，超时返回 `PortalError::ElementTimeout`。
    /// 元素拿到手后页面仍可能变化，调用方对后续操作的失败要有准备。
    ///
    /// # 参数
    /// - `selector`: CSS 选择器
    /// - `timeout_secs`: 超时秒数
    pub async fn wait_for_element(&self, selector: &str, timeout_secs: u64) -> Result<Element> {
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(PortalError::ElementTimeout {
                    selector: selector.to_string(),
                    timeout_secs,
                }
                .into());
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// 元素当前是否存在（单次探测，不等待）
    pub async fn exists(&self, selector: &str) -> bool {
        self.page.find_element(selector).await.is_ok()
    }

    /// 清空输入框
    ///
    /// 门户是 Angular 页面，直接改 value 不会触发它的表单监听，
    /// 需要补发一个 input 事件。
    pub async fn clear_value(&self, selector: &str) -> Result<()> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (el) {{
                    el.value = '';
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                }}
                return true;
            }})()"#,
            selector = serde_json::to_string(selector)?,
        );
        self.eval(js).await?;
        Ok(())
    }

    /// 页面源码中是否包含指定文本
    pub async fn page_source_contains(&self, needle: &str) -> Result<bool> {
        let js = format!(
            "document.documentElement.outerHTML.includes({})",
            serde_json::to_string(needle)?,
        );
        self.eval_as::<bool>(js).await
    }

    /// 当前页面 URL
    pub async fn current_url(&self) -> Result<String> {
        let url = self.page.url().await.map_err(PortalError::from)?;
        url.ok_or_else(|| PortalError::SessionLost.into())
    }

    /// 刷新页面
    pub async fn refresh(&self) -> Result<()> {
        self.page.reload().await.map_err(PortalError::from)?;
        Ok(())
    }

    /// 保存整页截图
    pub async fn save_screenshot(&self, path: impl AsRef<Path>) -> Result<()> {
        self.page
            .save_screenshot(
                ScreenshotParams::builder().full_page(true).build(),
                path,
            )
            .await
            .map_err(PortalError::from)?;
        Ok(())
    }
}
