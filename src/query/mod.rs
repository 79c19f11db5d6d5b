//! Everything needed to build a request before it is sent: the query text (from disk, from the built-in
//! queries or from a template) and its variables.

pub mod loader;
pub mod template;
pub mod variables;
