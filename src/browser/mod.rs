//! 浏览器模块

pub mod handle;

pub use handle::BrowserHandle;
