//! Mosaic generation client
//!
//! This library provides the client side of the mosaic generator: uploading
//! main and tile images, submitting generation jobs, tracking their progress
//! by polling the backend, and keeping a per-project history of results.

pub mod app_state;
pub mod config;
pub mod models;
pub mod services;
pub mod tracker;
