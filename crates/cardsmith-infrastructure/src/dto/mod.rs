//! Data Transfer Objects (DTOs) between the durable store and the domain.

pub mod session;

pub use session::{EPOCH_TIMESTAMP, decode_active_id, decode_sessions, encode_sessions};
