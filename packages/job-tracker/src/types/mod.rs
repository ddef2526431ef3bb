pub mod config;
pub mod posting;
pub mod summary;
