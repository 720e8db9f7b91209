//! Job execution on the worker pool.
//!
//! Each worker takes one job at a time from the queue and drives it through
//! the lifecycle:
//!
//! 1. [`AudioExtractor`] writes the audio track into the scratch directory
//! 2. [`ExecutionEngine`] launches an isolated inference unit for it
//! 3. The unit is polled until it exits (or shutdown is signalled)
//! 4. The subtitle artifact is read back from the scratch directory
//! 5. [`ResultForwarder`] delivers it downstream
//!
//! The unit is stopped and the scratch files removed on every exit path.
//! The traits let tests replace Docker, ffmpeg and the network with fakes.

pub mod executor;
pub mod extractor;
pub mod forwarder;
pub mod lifecycle;
pub mod pool;

pub use executor::{DockerEngine, ExecutionEngine, InferenceRequest, UnitHandle};
pub use extractor::{AudioExtractor, FfmpegExtractor};
pub use forwarder::{GrpcForwarder, ResultForwarder};
pub use lifecycle::{ExecutionContext, JobRunner, Outcome, Stage};
pub use pool::WorkerPool;
