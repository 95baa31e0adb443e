//! tmtop build script.
//!
//! Sets `TMTOP_VERSION`, which can be overridden for packaged builds.

pub fn main() {
    let force_version_env_var_name = "TMTOP_FORCE_VERSION";

    println!("cargo:rerun-if-env-changed={force_version_env_var_name}");

    let version = match std::env::var(force_version_env_var_name) {
        Ok(version) if !version.is_empty() => version,
        _ => std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".to_owned()),
    };

    println!("cargo:rustc-env=TMTOP_VERSION={version}");
}
