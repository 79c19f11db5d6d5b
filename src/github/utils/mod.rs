pub mod diagnostics;
pub mod executor;
pub mod paginator;
