//! 浏览器生命周期管理
//!
//! 启动、存活检测、重启、关闭都收在 `BrowserHandle` 里，
//! 上层只拿 `Page` 的引用，不直接接触 chromiumoxide 的启动细节。

use anyhow::Result;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::PortalError;

/// 浏览器句柄
///
/// 职责：
/// - 按配置启动 Chrome（有界面 / 无头）并导航到起始页
/// - 探测会话是否仍然存活
/// - 会话失效时原地重启
/// - 结束时完整关闭浏览器进程
pub struct BrowserHandle {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    headless: bool,
}

impl BrowserHandle {
    /// 启动浏览器并导航到指定 URL
    pub async fn launch(headless: bool, url: &str) -> Result<Self> {
        info!("🚀 启动浏览器 ({})...", if headless { "无头" } else { "有界面" });
        debug!("目标 URL: {}", url);

        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .args(vec![
                "--disable-notifications",
                "--disable-gpu",
                "--disable-extensions",
                "--disable-infobars",
                "--disable-popup-blocking",
                "--disable-dev-shm-usage",   // 防止共享内存不足
                "--no-sandbox",              // 禁用沙盒，防止权限问题导致的崩溃
                "--remote-debugging-port=0", // 让浏览器自动选择调试端口
            ]);
        builder = if headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };

        let config = builder.build().map_err(|e| {
            error!("配置浏览器失败: {}", e);
            PortalError::LaunchFailed { message: e }
        })?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            error!("启动浏览器失败: {}", e);
            PortalError::LaunchFailed {
                message: e.to_string(),
            }
        })?;
        debug!("浏览器启动成功");

        // 在后台处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        // 添加短暂延迟以等待浏览器状态同步
        sleep(tokio::time::Duration::from_millis(300)).await;

        let page = browser.new_page(url).await.map_err(|e| {
            error!("创建页面失败: {}", e);
            PortalError::navigation_failed(url, e)
        })?;

        info!("✅ 浏览器已导航到: {}", url);

        Ok(Self {
            browser,
            page,
            handler_task,
            headless,
        })
    }

    /// 当前页面
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 会话是否仍然存活
    ///
    /// 用一次轻量的 url 查询探测，失败视为会话已失效。
    pub async fn is_alive(&self) -> bool {
        self.page.url().await.is_ok()
    }

    /// 原地重启浏览器并重新导航
    pub async fn restart(&mut self, url: &str) -> Result<()> {
        warn!("🔄 检测到会话失效，重启浏览器...");

        // 先尝试体面关闭旧进程，事件循环还在跑才能送出关闭命令
        if let Err(e) = self.browser.close().await {
            warn!("关闭旧浏览器失败（忽略）: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();

        *self = Self::launch(self.headless, url).await?;
        info!("✅ 浏览器重启完成");
        Ok(())
    }

    /// 关闭浏览器
    pub async fn shutdown(mut self) {
        info!("🔚 关闭浏览器...");
        if let Err(e) = self.browser.close().await {
            warn!("关闭浏览器失败: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}
