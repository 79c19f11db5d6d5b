//! What `ghgql` knows about its own build (name, version, authors...), generated at compile time by the
//! `built` crate. See more: [https://docs.rs/built/0.5.2/built/](https://docs.rs/built/0.5.2/built/)

use log::LevelFilter;

pub mod built_info {
    // generated by build.rs
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Log level used when `--log-level` is not given: debug builds are chattier.
pub fn default_log_level() -> LevelFilter {
    if built_info::DEBUG {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Binary name; also the only log target let through by the logger.
pub fn package_name() -> &'static str {
    built_info::PKG_NAME
}

pub fn full_version() -> &'static str {
    built_info::PKG_VERSION
}

pub fn authors() -> &'static str {
    built_info::PKG_AUTHORS
}

/// One-line summary shown by `--help`.
pub fn description() -> &'static str {
    built_info::PKG_DESCRIPTION
}

/// `User-Agent` header value sent with every GraphQL request (GitHub rejects requests without one).
pub fn user_agent() -> String {
    format!("{}/{}", package_name(), full_version())
}
