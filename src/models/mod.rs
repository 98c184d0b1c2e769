//! Data models shared by the engine and the front end.

pub mod config;
pub mod mapping;
pub mod media;
pub mod plan;
pub mod report;
