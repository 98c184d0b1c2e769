//! Core business logic modules.

pub mod apply;
pub mod cancel;
pub mod extractor;
pub mod heuristic;
pub mod planner;
pub mod preview;
pub mod reconciler;
pub mod rollback;
pub mod scanner;
pub mod store;
