//! Computes the `--version` string.
//!
//! Release builds (HEAD exactly on a tag) report the package version; every
//! other build reports `dev@<short hash>`, or `dev@unknown` outside git.

use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");

    let on_release_tag = git(&["describe", "--exact-match", "--tags", "HEAD"]).is_some();
    let version = if on_release_tag {
        std::env::var("CARGO_PKG_VERSION").unwrap_or_default()
    } else {
        match git(&["rev-parse", "--short", "HEAD"]) {
            Some(hash) if !hash.is_empty() => format!("dev@{hash}"),
            _ => "dev@unknown".to_string(),
        }
    };

    println!("cargo:rustc-env=MEDIA_SIZER_VERSION={version}");
}
