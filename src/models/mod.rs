pub mod image;
pub mod job;
pub mod project;
pub mod settings;
