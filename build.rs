// build.rs
// Records the build profile so the binary can report it at startup. Release
// builds for production runs should also pass `-C target-cpu=native` through
// RUSTFLAGS: the permutation loops dominate run time and a build script can
// only forward `-l`/`-L` through `rustc-flags`.

use std::env;

fn main() {
    // Tell Cargo to only re-run this build script if build.rs itself changes.
    println!("cargo:rerun-if-changed=build.rs");

    let profile = env::var("PROFILE").unwrap_or_else(|_| {
        eprintln!("[build.rs] WARN: PROFILE environment variable not found. Assuming 'debug' build.");
        "debug".to_string()
    });

    println!("cargo:rustc-env=BMA_QTL_BUILD_PROFILE={}", profile);
}
