//! This build script copies the `memory.x` file from the crate root into
//! a directory where the linker can always find it at build time, and
//! stamps the firmware version with the current commit.

use std::{env, fs::File, io::Write, path::PathBuf, process::Command};

fn linker_data() -> &'static [u8] {
    include_bytes!("memory.x")
}

fn git_hash() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_owned())
        .unwrap_or_else(|| "unknown".to_owned())
}

fn main() {
    // Put `memory.x` in our output directory and ensure it's
    // on the linker search path.
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(linker_data())
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=memory.x");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    if env::var("CARGO_FEATURE_DEFMT").is_ok() {
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }

    let pkg_version = env!("CARGO_PKG_VERSION");
    let hash = git_hash();
    println!("cargo:rustc-env=FW_VERSION={pkg_version}-{hash}");
}
