//! Caching stages: fetch-once cache, sub-resource loader, join, fold and the
//! materialized view

pub mod fetch_once;
pub mod fold;
pub mod join;
pub mod materialized_view;
pub mod sub_resource;

pub use fetch_once::*;
pub use fold::*;
pub use join::*;
pub use materialized_view::*;
pub use sub_resource::*;
