//! Multicast stream primitives shared by the dataflow stages

pub mod replay;

pub use replay::*;
