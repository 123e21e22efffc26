pub mod checkpoint;
pub mod gstin;
pub mod job;
pub mod pan;

pub use checkpoint::Checkpoint;
pub use gstin::{GstinDetails, GstinRow, LookupResult};
pub use job::{JobParameters, JobProgress, JobRecord, JobStatus};
pub use pan::{is_valid_pan, PanRow, PanStatus, PAN_PATTERN};
