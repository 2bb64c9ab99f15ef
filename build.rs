use std::process::Command;

/// Run a git command and return trimmed stdout when it succeeds
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let version = env!("CARGO_PKG_VERSION");
    let profile = std::env::var("PROFILE").unwrap_or_default();

    // Release builds report the crate version, everything else reports the commit
    let version_str = if profile == "release" {
        version.to_string()
    } else {
        let hash = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());

        // `diff-index --quiet` exits non-zero when the worktree is dirty
        let dirty = Command::new("git")
            .args(["diff-index", "--quiet", "HEAD"])
            .output()
            .map(|output| !output.status.success())
            .unwrap_or(false);

        if dirty {
            format!("{} ({}-dirty)", version, hash)
        } else {
            format!("{} ({})", version, hash)
        }
    };

    println!("cargo:rustc-env=VERSION_STRING={}", version_str);
}
