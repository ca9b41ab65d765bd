pub mod api;
pub mod auth;
pub mod images;
pub mod jobs;
pub mod projects;
