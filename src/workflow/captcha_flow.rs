//! 验证码处理流程 - 流程层
//!
//! 核心职责：定义"一次验证码挑战"的完整处理流程
//!
//! 流程顺序：
//! 1. 等验证码图片加载完成（captcha-loading 类消失）
//! 2. 元素截图，截图不可用时改为直连下载图片
//! 3. 逐个账号识别 → 填入 → 提交
//! 4. 判定提交落点（结果页 / 验证码被拒）
//!
//! 整轮失败就刷新页面换一张新验证码，最多重试配置的次数。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::Element;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::PortalError;
use crate::infrastructure::PortalPage;
use crate::services::CaptchaSolver;
use crate::utils::time::unix_ts;

/// 验证码输入框
const CAPTCHA_INPUT: &str = "#fo-captcha";
/// 验证码图片
const CAPTCHA_IMAGE: &str = "#imgCaptcha";
/// 搜索按钮
const SEARCH_BUTTON: &str = "#lotsearch";
/// 结果表（门户的专用表格类名）
const RESULTS_TABLE: &str = "table.table.tbl.inv.exp.table-bordered.ng-table";
/// 无记录提示文本
const NO_RECORDS_MARKER: &str = "No records found";
/// 图片未加载完成时门户挂在 img 上的类名
const CAPTCHA_LOADING_CLASS: &str = "captcha-loading";

/// 验证码元素等待超时
const ELEMENT_WAIT_SECS: u64 = 10;
/// captcha-loading 类消失的等待上限
const IMAGE_LOAD_WAIT_SECS: u64 = 10;
/// 图片加载状态的轮询间隔
const IMAGE_POLL_MS: u64 = 500;
/// 提交后的固定等待
const SUBMIT_SETTLE_SECS: u64 = 3;
/// 刷新换码后的等待
const REFRESH_SETTLE_SECS: u64 = 2;
/// 直连下载图片的超时
const DOWNLOAD_TIMEOUT_SECS: u64 = 10;
/// 截图小于该字节数时视为没截到内容
const MIN_SCREENSHOT_BYTES: u64 = 1000;

/// 验证码处理状态
///
/// Idle → CaptchaPresented → Solving → Submitted →
/// {ResultsReady | CaptchaRejected | Error}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaState {
    /// 尚未开始
    Idle,
    /// 验证码已出现在页面上且图片加载完成
    CaptchaPresented,
    /// 正在调用识别接口
    Solving,
    /// 答案已提交，等待判定
    Submitted,
    /// 已进入结果页
    ResultsReady,
    /// 答案被门户拒绝，需要换码重试
    CaptchaRejected,
    /// 重试次数用尽
    Error,
}

/// 提交答案后对页面的一次探测
#[derive(Debug, Clone, Copy, Default)]
pub struct PageProbe {
    /// 页面上是否出现结果表
    pub has_results_table: bool,
    /// 页面源码中是否出现无记录提示
    pub has_no_records_marker: bool,
    /// 验证码输入框是否仍然存在
    pub captcha_input_present: bool,
}

/// 判定提交后的落点
///
/// 门户有时直接跳走，结果表和无记录提示都不出现，此时按成功处理。
pub fn classify_submission(probe: PageProbe) -> CaptchaState {
    if probe.has_results_table || probe.has_no_records_marker {
        CaptchaState::ResultsReady
    } else if probe.captcha_input_present {
        CaptchaState::CaptchaRejected
    } else {
        CaptchaState::ResultsReady
    }
}

/// 直接截图是否可用于识别
///
/// 门户的验证码经常在 DOM 渲染完成前被截到，表现为超小文件或 1x1 尺寸。
fn screenshot_usable(path: &Path) -> bool {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return false,
    };
    if size < MIN_SCREENSHOT_BYTES {
        return false;
    }
    match image::image_dimensions(path) {
        Ok((width, height)) => width > 2 && height > 2,
        Err(_) => false,
    }
}

/// 验证码处理流程
///
/// 职责：
/// - 编排"截图 → 识别 → 填入 → 提交 → 判定"的完整回合
/// - 决定何时换账号、何时刷新换码
/// - 不持有 page 资源
/// - 不关心 PAN / GSTIN 搜索本身
pub struct CaptchaFlow {
    solver: CaptchaSolver,
    download_client: reqwest::Client,
    max_retries: usize,
    screenshot_dir: PathBuf,
}

impl CaptchaFlow {
    /// 创建新的验证码处理流程
    pub fn new(config: &Config) -> Self {
        // 直连下载要带上浏览器同款请求头，否则门户会拒绝
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
            ),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let download_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            solver: CaptchaSolver::new(config),
            download_client,
            max_retries: config.max_captcha_retries,
            screenshot_dir: PathBuf::from(&config.screenshot_dir),
        }
    }

    /// 处理当前页面上的验证码，直到进入结果页或重试用尽
    pub async fn run(&self, portal: &PortalPage) -> CaptchaState {
        for attempt in 1..=self.max_retries {
            info!("🔐 验证码处理 第 {}/{} 轮", attempt, self.max_retries);

            match self.attempt(portal).await {
                Ok(CaptchaState::ResultsReady) => return CaptchaState::ResultsReady,
                Ok(state) => {
                    warn!("⚠️ 本轮验证码未通过: {:?}", state);
                }
                Err(e) => {
                    error!("❌ 第 {} 轮验证码处理出错: {}", attempt, e);
                }
            }

            // 刷新换一张新验证码再试
            if attempt < self.max_retries {
                info!("🔄 刷新页面获取新验证码");
                if let Err(e) = portal.refresh().await {
                    error!("❌ 刷新页面失败: {}", e);
                    return CaptchaState::Error;
                }
                sleep(Duration::from_secs(REFRESH_SETTLE_SECS)).await;
            }
        }

        error!("❌ 验证码 {} 轮尝试全部失败", self.max_retries);
        CaptchaState::Error
    }

    /// 一轮完整的"截图 → 识别 → 提交"
    async fn attempt(&self, portal: &PortalPage) -> Result<CaptchaState> {
        debug!("验证码状态: {:?}", CaptchaState::Idle);

        let captcha_input = portal
            .wait_for_element(CAPTCHA_INPUT, ELEMENT_WAIT_SECS)
            .await?;
        info!("✓ 找到验证码输入框");

        let captcha_image = self.wait_for_image(portal).await?;
        debug!("验证码状态: {:?}", CaptchaState::CaptchaPresented);

        // 先直接对元素截图，截图不可用再退回直连下载
        let unix = unix_ts();
        let mut captcha_path = self
            .screenshot_dir
            .join(format!("captcha_direct_{}.png", unix));
        captcha_image
            .save_screenshot(CaptureScreenshotFormat::Png, &captcha_path)
            .await
            .map_err(PortalError::from)?;
        info!("💾 验证码截图: {}", captcha_path.display());

        if !screenshot_usable(&captcha_path) {
            warn!("⚠️ 直接截图不可用，改为从图片地址下载");
            if let Some(downloaded) = self.download_captcha(portal, &captcha_image, unix).await {
                captcha_path = downloaded;
            }
        }

        debug!("验证码状态: {:?}", CaptchaState::Solving);
        for account_index in 0..self.solver.account_count() {
            let solution = match self.solver.solve(&captcha_path, account_index).await {
                Some(solution) => solution,
                None => continue,
            };

            portal.clear_value(CAPTCHA_INPUT).await?;
            captcha_input.click().await.map_err(PortalError::from)?;
            captcha_input
                .type_str(&solution)
                .await
                .map_err(PortalError::from)?;
            info!("✓ 已填入验证码: {}", solution);

            let search_button = portal
                .wait_for_element(SEARCH_BUTTON, ELEMENT_WAIT_SECS)
                .await?;
            search_button.click().await.map_err(PortalError::from)?;
            info!("🚀 已点击搜索按钮");
            debug!("验证码状态: {:?}", CaptchaState::Submitted);

            sleep(Duration::from_secs(SUBMIT_SETTLE_SECS)).await;

            let probe = self.probe_page(portal).await;
            if classify_submission(probe) == CaptchaState::ResultsReady {
                info!("✅ 验证码通过，已进入结果页");
                return Ok(CaptchaState::ResultsReady);
            }
            warn!("⚠️ 验证码答案被拒绝，换下一个账号");
        }

        Ok(CaptchaState::CaptchaRejected)
    }

    /// 等验证码图片出现且加载完成
    ///
    /// 门户在图片加载期间给 img 挂 captcha-loading 类，类名消失前截到的
    /// 都是占位图。类名变化会刷新元素，等完后要重新查找拿新引用。
    async fn wait_for_image(&self, portal: &PortalPage) -> Result<Element> {
        let mut captcha_image = portal
            .wait_for_element(CAPTCHA_IMAGE, ELEMENT_WAIT_SECS)
            .await?;

        let class = captcha_image
            .attribute("class")
            .await
            .map_err(PortalError::from)?;
        let loading = class
            .map(|c| c.contains(CAPTCHA_LOADING_CLASS))
            .unwrap_or(false);
        if !loading {
            return Ok(captcha_image);
        }

        info!("⏳ 验证码图片仍在加载，等待完成...");
        let deadline = Instant::now() + Duration::from_secs(IMAGE_LOAD_WAIT_SECS);
        loop {
            sleep(Duration::from_millis(IMAGE_POLL_MS)).await;

            let fresh = portal.wait_for_element(CAPTCHA_IMAGE, 1).await?;
            let still_loading = fresh
                .attribute("class")
                .await
                .map_err(PortalError::from)?
                .map(|c| c.contains(CAPTCHA_LOADING_CLASS))
                .unwrap_or(false);
            captcha_image = fresh;

            if !still_loading {
                info!("✓ 验证码图片加载完成");
                break;
            }
            if Instant::now() >= deadline {
                warn!("⚠️ 等待验证码图片加载超时，继续处理");
                break;
            }
        }

        Ok(captcha_image)
    }

    /// 从图片的 src 地址直连下载验证码
    ///
    /// 带随机参数强制门户返回新图，避免命中缓存的占位图。
    async fn download_captcha(
        &self,
        portal: &PortalPage,
        image: &Element,
        unix: i64,
    ) -> Option<PathBuf> {
        let src = match image.attribute("src").await {
            Ok(Some(src)) if !src.is_empty() => src,
            Ok(_) => {
                warn!("⚠️ 验证码图片没有 src 属性");
                return None;
            }
            Err(e) => {
                warn!("⚠️ 读取验证码图片 src 失败: {}", e);
                return None;
            }
        };

        let current_url = portal.current_url().await.ok()?;
        let mut full_url = if src.starts_with('/') {
            // 相对地址补上协议和域名
            let base = current_url.split('/').take(3).collect::<Vec<_>>().join("/");
            format!("{}{}", base, src)
        } else {
            src
        };
        if full_url.contains('?') {
            full_url.push_str(&format!("&refresh={}", rand::random::<f64>()));
        } else {
            full_url.push_str(&format!("?refresh={}", rand::random::<f64>()));
        }

        info!("🔍 直连下载验证码: {}", full_url);

        let response = match self
            .download_client
            .get(&full_url)
            .header(REFERER, &current_url)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("⚠️ 下载验证码失败: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            warn!("⚠️ 下载验证码返回 {}", response.status());
            return None;
        }

        let bytes = response.bytes().await.ok()?;
        let path = self
            .screenshot_dir
            .join(format!("captcha_download_{}.png", unix));
        if let Err(e) = fs::write(&path, &bytes) {
            warn!("⚠️ 保存下载的验证码失败: {}", e);
            return None;
        }
        info!("💾 已保存直连下载的验证码: {}", path.display());
        Some(path)
    }

    /// 提交答案后探测页面落在哪里
    async fn probe_page(&self, portal: &PortalPage) -> PageProbe {
        PageProbe {
            has_results_table: portal.exists(RESULTS_TABLE).await,
            has_no_records_marker: portal
                .page_source_contains(NO_RECORDS_MARKER)
                .await
                .unwrap_or(false),
            captcha_input_present: portal.exists(CAPTCHA_INPUT).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_results_table_means_ready() {
        let probe = PageProbe {
            has_results_table: true,
            has_no_records_marker: false,
            captcha_input_present: false,
        };
        assert_eq!(classify_submission(probe), CaptchaState::ResultsReady);
    }

    #[test]
    fn test_classify_no_records_means_ready() {
        let probe = PageProbe {
            has_results_table: false,
            has_no_records_marker: true,
            // 无记录提示和输入框同屏时以提示为准
            captcha_input_present: true,
        };
        assert_eq!(classify_submission(probe), CaptchaState::ResultsReady);
    }

    #[test]
    fn test_classify_lingering_input_means_rejected() {
        let probe = PageProbe {
            has_results_table: false,
            has_no_records_marker: false,
            captcha_input_present: true,
        };
        assert_eq!(classify_submission(probe), CaptchaState::CaptchaRejected);
    }

    #[test]
    fn test_classify_blank_page_assumes_ready() {
        assert_eq!(
            classify_submission(PageProbe::default()),
            CaptchaState::ResultsReady
        );
    }

    #[test]
    fn test_screenshot_usable_rejects_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        fs::write(&path, vec![0u8; 100]).unwrap();
        assert!(!screenshot_usable(&path));
    }

    #[test]
    fn test_screenshot_usable_rejects_undecodable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.png");
        fs::write(&path, vec![0xCD; 4096]).unwrap();
        assert!(!screenshot_usable(&path));
    }

    #[test]
    fn test_screenshot_usable_accepts_normal_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.png");
        // 噪声图，保证 PNG 压不到 1000 字节以下
        let mut seed: u64 = 0x1234_5678_9ABC_DEF0;
        let img: image::GrayImage = image::ImageBuffer::from_fn(200, 80, |_, _| {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            image::Luma([(seed >> 33) as u8])
        });
        img.save(&path).unwrap();
        assert!(screenshot_usable(&path));
    }

    #[test]
    fn test_screenshot_usable_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!screenshot_usable(&dir.path().join("nope.png")));
    }
}
