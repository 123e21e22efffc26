pub mod captcha_flow;
pub mod detail_flow;
pub mod pan_ctx;
pub mod search_flow;

pub use captcha_flow::{classify_submission, CaptchaFlow, CaptchaState, PageProbe};
pub use detail_flow::DetailFlow;
pub use pan_ctx::PanCtx;
pub use search_flow::SearchFlow;
