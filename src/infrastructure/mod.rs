//! 基础设施层
//!
//! 持有稀缺资源（Page），只暴露能力，不认识业务

pub mod portal_page;

pub use portal_page::PortalPage;
