//! Daybreak — daily-habit coaching backend.

pub mod clock;
pub mod config;
pub mod error;
pub mod routing;
pub mod sequences;
pub mod store;
pub mod support;
