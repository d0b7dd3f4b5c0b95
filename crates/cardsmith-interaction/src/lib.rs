pub mod http_generation_service;

pub use http_generation_service::HttpGenerationClient;
