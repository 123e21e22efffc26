pub mod captcha_solver;
pub mod checkpoint_ledger;
pub mod job_registry;
pub mod spreadsheet_store;

pub use captcha_solver::{validate_captcha_image, CaptchaSolver};
pub use checkpoint_ledger::CheckpointLedger;
pub use job_registry::JobRegistry;
pub use spreadsheet_store::SpreadsheetStore;
