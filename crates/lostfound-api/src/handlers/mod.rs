//! API route handlers

pub mod delete;
pub mod health;
pub mod search;
pub mod status;
pub mod upload;
