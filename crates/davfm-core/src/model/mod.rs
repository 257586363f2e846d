//! Data model: resources and host profiles.

pub mod host;
pub mod resource;

pub use host::{Host, HostId};
pub use resource::{format_size, Resource};
