//! Upload module
//!
//! Sends encoded recordings with their task metadata to the practice backend
//! and fetches quick-task prompts.

mod client;
mod guard;
mod types;

pub use client::{HttpBackend, UploadBackend, UploadError};
pub use guard::GuardedUploader;
pub use types::{AnalysisSummary, AudioBlob, QuickTask, SpeechAnalysis, TaskContext, UploadResponse};
