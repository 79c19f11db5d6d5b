//! JSON wrappers for GitHub's GraphQL wire format.

pub mod page;
pub mod payload;
pub mod response;
