//! Command implementations

pub mod build;
pub mod check;
pub mod clean;
pub mod list;
