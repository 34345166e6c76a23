//! Stamps the server binary with its source revision and build time
//!
//! Exposed to the crate as `PROPMAP_GIT_REV`, `PROPMAP_BUILT_AT` and
//! `PROPMAP_PROFILE`; logged at startup and reported by `/health`.

use std::process::Command;

fn git_rev() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=8"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let rev = String::from_utf8(output.stdout).ok()?;
    let rev = rev.trim();
    (!rev.is_empty()).then(|| rev.to_string())
}

fn main() {
    println!("cargo:rerun-if-changed=../.git/HEAD");

    let rev = git_rev().unwrap_or_else(|| "unknown".into());
    let built_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".into());

    for (key, value) in [
        ("PROPMAP_GIT_REV", rev),
        ("PROPMAP_BUILT_AT", built_at.to_string()),
        ("PROPMAP_PROFILE", profile),
    ] {
        println!("cargo:rustc-env={key}={value}");
    }
}
