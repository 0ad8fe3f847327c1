//! Lost & Found RESTful API
//!
//! Exposes item upload, text and image similarity search, ingestion status
//! polling and authorized deletion over HTTP, plus a typed client.

pub mod client;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;

pub use client::{ClientError, LostFoundClient};
pub use server::ApiServer;
pub use state::AppState;
