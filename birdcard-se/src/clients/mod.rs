//! HTTP clients for the engine's external collaborators

pub mod device_registry;
pub mod http;
pub mod ip_geo;
pub mod observations;
pub mod publish;

pub use device_registry::HttpDeviceRegistry;
pub use ip_geo::IpApiClient;
pub use observations::EBirdClient;
pub use publish::HttpPublisher;
