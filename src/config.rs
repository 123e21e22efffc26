use serde::Deserialize;

/// TrueCaptcha 账号
///
/// 免费额度按账号计算，配置多个账号可以在识别失败或额度用尽时顺序切换。
#[derive(Clone, Debug, Deserialize)]
pub struct CaptchaAccount {
    pub userid: String,
    pub apikey: String,
}

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// GST 门户 PAN 搜索页
    pub portal_search_url: String,
    /// GST 门户 GSTIN 详情搜索页
    pub portal_details_url: String,
    /// TrueCaptcha 识别接口
    pub truecaptcha_api_url: String,
    /// TrueCaptcha 账号列表（按顺序切换）
    pub captcha_accounts: Vec<CaptchaAccount>,
    /// 断点文件路径
    pub checkpoint_file: String,
    /// 任务记录文件路径
    pub jobs_file: String,
    /// 截图存放目录
    pub screenshot_dir: String,
    /// 每处理多少个 PAN 保存一次断点
    pub batch_size: usize,
    /// 单个 PAN 的验证码重试上限
    pub max_captcha_retries: usize,
    /// 相邻 PAN 之间的最小延迟（秒）
    pub delay_min_secs: f64,
    /// 相邻 PAN 之间的最大延迟（秒）
    pub delay_max_secs: f64,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_search_url: "https://services.gst.gov.in/services/searchtpbypan".to_string(),
            portal_details_url: "https://services.gst.gov.in/services/searchtp".to_string(),
            truecaptcha_api_url: "https://api.apitruecaptcha.org/one/gettext".to_string(),
            captcha_accounts: vec![
                CaptchaAccount {
                    userid: "nityamkathuria@registerkaro.co.in".to_string(),
                    apikey: "EHfymf49KxooX6UPw5Lz".to_string(),
                },
                CaptchaAccount {
                    userid: "vedanshrk".to_string(),
                    apikey: "cmpVOJlCk8Vb0ezBEQuL".to_string(),
                },
            ],
            checkpoint_file: "pan_gstin_checkpoint.json".to_string(),
            jobs_file: "jobs.json".to_string(),
            screenshot_dir: "screenshots".to_string(),
            batch_size: 10,
            max_captcha_retries: 5,
            delay_min_secs: 1.0,
            delay_max_secs: 3.0,
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            portal_search_url: std::env::var("PORTAL_SEARCH_URL").unwrap_or(default.portal_search_url),
            portal_details_url: std::env::var("PORTAL_DETAILS_URL").unwrap_or(default.portal_details_url),
            truecaptcha_api_url: std::env::var("TRUECAPTCHA_API_URL").unwrap_or(default.truecaptcha_api_url),
            captcha_accounts: std::env::var("TRUECAPTCHA_ACCOUNTS").ok().and_then(|v| serde_json::from_str(&v).ok()).unwrap_or(default.captcha_accounts),
            checkpoint_file: std::env::var("CHECKPOINT_FILE").unwrap_or(default.checkpoint_file),
            jobs_file: std::env::var("JOBS_FILE").unwrap_or(default.jobs_file),
            screenshot_dir: std::env::var("SCREENSHOT_DIR").unwrap_or(default.screenshot_dir),
            batch_size: std::env::var("BATCH_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.batch_size),
            max_captcha_retries: std::env::var("MAX_CAPTCHA_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_captcha_retries),
            delay_min_secs: std::env::var("DELAY_MIN_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.delay_min_secs),
            delay_max_secs: std::env::var("DELAY_MAX_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.delay_max_secs),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
    }
}

/// 单次运行的命令行选项
///
/// 与 `Config` 分开：`Config` 描述环境，`RunOptions` 描述某一次运行要做什么。
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// 输入 Excel 文件路径
    pub excel_file: String,
    /// 是否以无头模式运行浏览器
    pub headless: bool,
    /// 测试模式：只处理第一个 PAN
    pub test_mode: bool,
    /// 最多处理的 PAN 数量
    pub limit: Option<usize>,
    /// 是否从断点继续
    pub resume: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            excel_file: "pan_numbers.xlsx".to_string(),
            headless: false,
            test_mode: false,
            limit: None,
            resume: false,
        }
    }
}
