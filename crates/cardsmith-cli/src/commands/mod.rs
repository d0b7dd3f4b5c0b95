pub mod bootstrap;
pub mod config;
pub mod generate;
pub mod resolve;
pub mod sessions;
