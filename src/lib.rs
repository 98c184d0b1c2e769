//! Series Linker Library
//!
//! Reconciles an unordered tree of TV episode files into a
//! `Show (Year)/Season NN/Show SNNEMM.ext` layout made of symbolic links,
//! using an AI classifier with a deterministic fallback.

pub mod cli;
pub mod core;
pub mod error;
pub mod models;
pub mod preflight;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
