mod errors;
mod source;
mod submission;

pub use errors::DomainError;
pub use source::{display_name, extract_video_id, slug, validate_email, SourceDocument};
pub use submission::{trigger_payload, Submission, SubmissionRequest};
