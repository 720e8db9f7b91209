pub mod job;
pub mod language;
pub mod queue;

pub use job::Job;
pub use language::Language;
pub use queue::JobQueue;
