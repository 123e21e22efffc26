//! # PAN GSTIN Mapper
//!
//! 一个从 GST 门户批量查询 PAN 名下 GSTIN 的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `PortalPage` - 唯一的 page owner，提供 eval() / 等元素 / 截图能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个对象
//! - `CaptchaSolver` - TrueCaptcha 识别能力
//! - `SpreadsheetStore` - 双表 Excel 校验 / 迁移 / 调和能力
//! - `CheckpointLedger` - 断点读写能力
//! - `JobRegistry` - 任务记录能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个 PAN / 一个 GSTIN"的完整处理流程
//! - `PanCtx` - 上下文封装（pan + 序号）
//! - `CaptchaFlow` - 验证码回合（截图 → 识别 → 提交 → 判定）
//! - `SearchFlow` - PAN 搜索流程（填表 → 验证码 → 提取）
//! - `DetailFlow` - GSTIN 详情流程
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量 PAN 处理器，管理资源和断点
//! - `orchestrator/detail_lookup` - 单个 GSTIN 详情查询
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::BrowserHandle;
pub use config::{Config, RunOptions};
pub use error::{AppError, AppResult};
pub use infrastructure::PortalPage;
pub use models::{Checkpoint, GstinDetails, GstinRow, LookupResult, PanRow, PanStatus};
pub use orchestrator::{lookup_gstin_details, App};
pub use services::{CaptchaSolver, CheckpointLedger, JobRegistry, SpreadsheetStore};
pub use workflow::{CaptchaFlow, CaptchaState, DetailFlow, PanCtx, SearchFlow};
