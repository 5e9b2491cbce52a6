use std::process::Command;

/// Variables a CI system may set with the commit being built, in priority order.
const COMMIT_ENV_VARS: &[&str] = &["GIT_COMMIT_HASH", "GITHUB_SHA"];

fn main() {
    for var in COMMIT_ENV_VARS {
        println!("cargo:rerun-if-env-changed={var}");
    }
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    let from_env = COMMIT_ENV_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|sha| sha.trim().to_string())
        .find(|sha| !sha.is_empty());

    if let Some(sha) = from_env.or_else(git_head) {
        println!("cargo:rustc-env=GIT_COMMIT_HASH={sha}");
    }
}

fn git_head() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}
