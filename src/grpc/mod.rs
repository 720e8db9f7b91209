pub mod generator_service;
pub mod receiver_service;
pub mod server;

pub use generator_service::GeneratorService;
pub use receiver_service::ReceiverService;
pub use server::GrpcServer;
