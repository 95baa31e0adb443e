//! Repeated constants used around tmtop

/// Version string, see the build script.
pub const VERSION: &str = env!("TMTOP_VERSION");

/// User agent used in http clients
pub const USER_AGENT: &str = concat!("tmtop/", env!("TMTOP_VERSION"));
