pub mod auth;
pub mod config;
pub mod error;
pub mod grpc;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod worker;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("subtitles");
}
