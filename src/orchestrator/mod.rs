//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量 PAN 处理器
//! - 管理应用生命周期（初始化、运行、调和）
//! - 计算工作列表（断点过滤 / 测试截断 / 数量上限）
//! - 管理浏览器资源（BrowserHandle、PortalPage）
//! - 按批次保存断点，跑完后全量写回 Excel
//!
//! ### `detail_lookup` - GSTIN 详情查询
//! - 单次查询的资源编排（起浏览器、跑流程、关浏览器）
//! - 与批量查询互不影响
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<PAN>)
//!     ↓
//! workflow::SearchFlow (处理单个 PAN)
//!     ↓
//! services (能力层：captcha / excel / checkpoint)
//!     ↓
//! infrastructure (基础设施：PortalPage)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，detail_lookup 管单个详情
//! 2. **资源隔离**：只有编排层持有 BrowserHandle
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **无业务逻辑**：只做调度和统计，不做具体业务判断

pub mod batch_processor;
pub mod detail_lookup;

// 重新导出主要类型
pub use batch_processor::{build_work_list, App, BatchCursor};
pub use detail_lookup::lookup_gstin_details;
