pub mod lock;
pub mod submission;

pub use lock::VideoLock;
pub use submission::{Submission, SubmissionStatus};
