// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    // Re-run build script if git HEAD changes
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=CAPTURE_VERSION");

    // Packaged builds pin the version explicitly
    let version = match std::env::var("CAPTURE_VERSION") {
        Ok(v) => v,
        Err(_) => describe_version(),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` output with the leading `v` stripped, or the crate version
/// with a short hash appended when no tag is reachable.
fn describe_version() -> String {
    let described = Command::new("git")
        .args(["describe", "--tags", "--match", "v*"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());

    if let Some(tag) = described {
        return tag.strip_prefix('v').unwrap_or(&tag).to_string();
    }

    let package = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    match short_hash() {
        Some(hash) => format!("{}-{}", package, hash),
        None => package,
    }
}

fn short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
