//! 验证码识别服务 - 业务能力层
//!
//! 只负责"把一张验证码图片变成 6 位数字"，不关心流程
//!
//! ## 技术栈
//! - 使用 `reqwest` 调用 TrueCaptcha 识别接口
//! - 使用 `image` 在发送前对截图做本地预检
//! - 图片以 base64 随 JSON 请求体上传

use std::fs;
use std::path::Path;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::GenericImageView;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CaptchaAccount, Config};
use crate::error::CaptchaError;

/// 识别接口超时
const API_TIMEOUT_SECS: u64 = 15;
/// 单账号的接口重试次数
const MAX_API_RETRIES: u32 = 3;
/// 小于该字节数的截图视为未渲染完成
const MIN_IMAGE_BYTES: u64 = 1000;
/// 平均灰度超过该值视为白图
const WHITE_MEAN_THRESHOLD: f64 = 240.0;
/// 门户验证码固定为 6 位数字
const CAPTCHA_LEN: usize = 6;

/// 识别请求体
#[derive(Serialize)]
struct TrueCaptchaRequest<'a> {
    userid: &'a str,
    apikey: &'a str,
    data: &'a str,
    numeric: u8,
    len_min: u8,
    len_max: u8,
}

/// 识别响应体
///
/// 成功时只有 result，失败时只有 error_message，两个都可能缺失。
#[derive(Deserialize)]
struct TrueCaptchaResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// 验证码图片本地预检
///
/// 按开销从小到大逐项检查，任何一项不通过就不再调用付费接口：
/// 文件存在 -> 非空 -> 字节数足够 -> 可解码 -> 尺寸正常 -> 不是白图。
pub fn validate_captcha_image(path: &Path) -> Result<(), CaptchaError> {
    let metadata = fs::metadata(path).map_err(|_| CaptchaError::ImageMissing {
        path: path.display().to_string(),
    })?;

    let size = metadata.len();
    if size == 0 {
        return Err(CaptchaError::ImageEmpty {
            path: path.display().to_string(),
        });
    }
    if size < MIN_IMAGE_BYTES {
        return Err(CaptchaError::ImageTooSmall { size });
    }

    let bytes = fs::read(path).map_err(|e| CaptchaError::ImageUndecodable {
        message: e.to_string(),
    })?;
    let image = image::load_from_memory(&bytes).map_err(|e| CaptchaError::ImageUndecodable {
        message: e.to_string(),
    })?;

    let (width, height) = image.dimensions();
    if width <= 2 || height <= 2 {
        return Err(CaptchaError::BadDimensions { width, height });
    }

    // 门户偶尔返回纯白占位图，识别接口对它只会浪费额度
    let luma = image.to_luma8();
    let total: u64 = luma.pixels().map(|p| u64::from(p.0[0])).sum();
    let mean = total as f64 / (u64::from(width) * u64::from(height)) as f64;
    if mean > WHITE_MEAN_THRESHOLD {
        return Err(CaptchaError::MostlyBlank { mean });
    }

    Ok(())
}

/// 验证码识别服务
///
/// 职责：
/// - 调用 TrueCaptcha API 识别单张验证码图片
/// - 识别前做本地图片预检，避免浪费接口额度
/// - 对临时性失败做指数退避重试
/// - 不操作浏览器
/// - 不决定账号切换顺序（由流程层按索引逐个尝试）
pub struct CaptchaSolver {
    client: reqwest::Client,
    api_url: String,
    accounts: Vec<CaptchaAccount>,
}

impl CaptchaSolver {
    /// 创建新的验证码识别服务
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_url: config.truecaptcha_api_url.clone(),
            accounts: config.captcha_accounts.clone(),
        }
    }

    /// 可用的账号数量
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// 识别一张验证码图片
    ///
    /// # 参数
    /// - `image_path`: 截图文件路径
    /// - `account_index`: 使用第几个 TrueCaptcha 账号
    ///
    /// # 返回
    /// 识别成功返回 6 位数字字符串，任何失败都返回 None（由上层决定换账号还是刷新重试）
    pub async fn solve(&self, image_path: &Path, account_index: usize) -> Option<String> {
        if let Err(e) = validate_captcha_image(image_path) {
            warn!("⚠️ 验证码图片预检不通过: {}", e);
            return None;
        }

        let account = self.accounts.get(account_index)?;
        let bytes = match fs::read(image_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("⚠️ 读取验证码图片失败 ({}): {}", image_path.display(), e);
                return None;
            }
        };
        let encoded = STANDARD.encode(&bytes);

        info!(
            "🔍 使用账号 {} 识别验证码 (图片 {} 字节)",
            account.userid,
            bytes.len()
        );

        for retry in 0..MAX_API_RETRIES {
            if retry > 0 {
                let wait_secs = 2u64.pow(retry);
                info!("⏳ 识别重试 {}/{}，等待 {}s", retry, MAX_API_RETRIES - 1, wait_secs);
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
            }

            let request = TrueCaptchaRequest {
                userid: &account.userid,
                apikey: &account.apikey,
                data: &encoded,
                numeric: 1,
                len_min: CAPTCHA_LEN as u8,
                len_max: CAPTCHA_LEN as u8,
            };

            let response = match self.client.post(&self.api_url).json(&request).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("⚠️ TrueCaptcha 请求失败: {}", e);
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() {
                warn!("⚠️ TrueCaptcha 服务端错误: {}", status);
                continue;
            }
            if !status.is_success() {
                warn!("❌ TrueCaptcha 返回 {}，放弃该账号", status);
                return None;
            }

            let body: TrueCaptchaResponse = match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    warn!("⚠️ TrueCaptcha 响应解析失败: {}", e);
                    continue;
                }
            };

            if let Some(raw) = body.result {
                // 接口偶尔混入空格或字母，只保留数字再校验长度
                let digits = Regex::new(r"[^0-9]")
                    .map(|re| re.replace_all(&raw, "").to_string())
                    .unwrap_or_default();
                if digits.len() == CAPTCHA_LEN {
                    info!("✓ 验证码识别成功: {}", digits);
                    return Some(digits);
                }
                warn!("⚠️ 识别结果 '{}' 不是 {} 位数字", raw, CAPTCHA_LEN);
                continue;
            }

            if let Some(message) = body.error_message {
                if message.contains("above free usage limit") {
                    warn!("💳 账号 {} 免费额度已用尽，放弃该账号", account.userid);
                    return None;
                }
                warn!("⚠️ TrueCaptcha 返回错误: {}", message);
                continue;
            }

            debug!("TrueCaptcha 响应既无 result 也无 error_message");
        }

        warn!("❌ 验证码识别失败（账号 {} 重试 {} 次后放弃）", account.userid, MAX_API_RETRIES);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 生成确定性噪声灰度图
    fn write_noise_png(path: &Path, width: u32, height: u32, base: u8, spread: u8) {
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        let img: image::GrayImage = image::ImageBuffer::from_fn(width, height, |_, _| {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let noise = (seed >> 33) as u8;
            image::Luma([base.saturating_add(noise % spread)])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_validate_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate_captcha_image(&dir.path().join("nope.png"));
        assert!(matches!(result, Err(CaptchaError::ImageMissing { .. })));
    }

    #[test]
    fn test_validate_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        fs::write(&path, b"").unwrap();
        let result = validate_captcha_image(&path);
        assert!(matches!(result, Err(CaptchaError::ImageEmpty { .. })));
    }

    #[test]
    fn test_validate_too_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        fs::write(&path, vec![0xAB; 500]).unwrap();
        let result = validate_captcha_image(&path);
        assert!(matches!(result, Err(CaptchaError::ImageTooSmall { size: 500 })));
    }

    #[test]
    fn test_validate_undecodable_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.png");
        fs::write(&path, vec![0xAB; 2000]).unwrap();
        let result = validate_captcha_image(&path);
        assert!(matches!(result, Err(CaptchaError::ImageUndecodable { .. })));
    }

    #[test]
    fn test_validate_bad_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thin.png");
        // 2 像素宽的长条，体积足够大但宽度不合格
        write_noise_png(&path, 2, 2000, 0, 255);
        let result = validate_captcha_image(&path);
        assert!(matches!(
            result,
            Err(CaptchaError::BadDimensions { width: 2, height: 2000 })
        ));
    }

    #[test]
    fn test_validate_mostly_blank() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.png");
        // 灰度集中在 246..=255，平均值必然超过 240
        write_noise_png(&path, 200, 200, 246, 10);
        let result = validate_captcha_image(&path);
        assert!(matches!(result, Err(CaptchaError::MostlyBlank { .. })));
    }

    #[test]
    fn test_validate_accepts_normal_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.png");
        write_noise_png(&path, 200, 80, 0, 255);
        assert!(validate_captcha_image(&path).is_ok());
    }

    /// 预检不通过时不应发起任何网络请求
    #[tokio::test]
    async fn test_solve_returns_none_for_invalid_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        fs::write(&path, vec![0xAB; 100]).unwrap();

        let solver = CaptchaSolver::new(&Config::default());
        assert_eq!(solver.solve(&path, 0).await, None);
    }

    #[tokio::test]
    async fn test_solve_returns_none_for_unknown_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.png");
        write_noise_png(&path, 200, 80, 0, 255);

        let solver = CaptchaSolver::new(&Config::default());
        let out_of_range = solver.account_count();
        assert_eq!(solver.solve(&path, out_of_range).await, None);
    }

    /// 测试 TrueCaptcha 真实接口连通性
    ///
    /// 运行方式：
    /// ```bash
    /// cargo test test_truecaptcha_live -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_truecaptcha_live() {
        let _ = tracing_subscriber::fmt::try_init();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captcha.png");
        write_noise_png(&path, 200, 80, 0, 255);

        let solver = CaptchaSolver::new(&Config::default());

        println!("\n========== 测试 TrueCaptcha 接口 ==========");
        println!("账号数量: {}", solver.account_count());
        let result = solver.solve(&path, 0).await;
        println!("识别结果: {:?}", result);
        println!("==========================================\n");
        // 噪声图大概率识别不出 6 位数字，这里只验证调用链路不会 panic
    }
}
