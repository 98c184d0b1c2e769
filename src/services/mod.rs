//! External service clients.

pub mod classifier;
