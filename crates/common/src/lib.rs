pub mod config;
pub mod lifecycle;
pub mod logger;
pub mod models;
