//! Data transfer objects.

pub mod response;
