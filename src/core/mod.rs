//! Core data types and models

pub mod command;
pub mod record;

pub use command::*;
pub use record::*;
