//! The HTTP adapter (spec §6): a thin `axum` layer translating wire
//! requests into [`crate::engine::Registry`] calls and engine errors into
//! the Confluent-style error envelope of spec §6.2/§7.

pub mod error;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::AppState;
pub use server::ApiServer;
