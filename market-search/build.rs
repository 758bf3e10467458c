// Build script to extract version from Cargo.toml
// and optionally override patch version from CI/CD pipeline

use std::env;

fn main() {
    let version = env::var("CARGO_PKG_VERSION").expect("CARGO_PKG_VERSION not set");

    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() != 3 {
        panic!("Invalid version format in Cargo.toml: {}", version);
    }
    let (major, minor, patch) = (parts[0], parts[1], parts[2]);

    // Release pipelines stamp the build number into the patch segment
    let final_patch = env::var("MARKET_PATCH_VERSION").unwrap_or_else(|_| patch.to_string());

    println!("cargo:rustc-env=MARKET_VERSION={}.{}.{}", major, minor, final_patch);
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-env-changed=MARKET_PATCH_VERSION");
}
