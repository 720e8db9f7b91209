use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::proto::ReceiveRequest;
use crate::scheduler::Language;

/// An accepted subtitle generation request.
///
/// Built by the gateway once the language is normalized, then owned by the
/// queue until exactly one worker takes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Unique per job, also names the job's files in the scratch directory
    pub id: Uuid,
    pub stream_id: i32,
    /// URI of the media playlist
    pub source: String,
    pub language: Language,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(stream_id: i32, source: String, language: Language) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream_id,
            source,
            language,
            created_at: Utc::now(),
        }
    }

    /// Outbound message carrying this job's subtitles to the receiver.
    pub fn receive_request(&self, subtitles: String) -> ReceiveRequest {
        ReceiveRequest {
            stream_id: self.stream_id,
            subtitles,
            language: self.language.code().to_string(),
        }
    }

    /// Time spent between admission and now.
    pub fn queued_for(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}
