//! GitHub's wrappers & miscellaneous utilities. Everything ranging from the HTTP [`Transport`](client::transport::Transport)
//! to the retrying [`RequestExecutor`](utils::executor::RequestExecutor) and the cursor-driven
//! [`Paginator`](utils::paginator::Paginator) is found in this module.

pub mod client;

pub mod json;

pub mod utils;
