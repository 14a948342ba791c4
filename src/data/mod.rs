//! Trial records and their dated storage.
pub mod storage;
pub mod trial;

pub use storage::{Clock, FixedClock, LogIdentity, SystemClock, TrialLog};
pub use trial::TrialRecord;
