//! Common test utilities and helpers for orgsync tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Environment variables the binary reads, cleared for every spawned run
const ISOLATED_VARS: &[&str] = &["GITHUB_TOKEN", "MAX_PARALLEL_JOBS", "RUST_LOG"];

/// Whether a usable `git` is on PATH; tests that need it skip otherwise
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Run git with a fixed identity, panicking on failure
pub fn git(cwd: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(["-c", "user.name=orgsync", "-c", "user.email=orgsync@example.com"])
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Scratch layout: a config home, a working directory, and bare origins
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config_home: PathBuf,
    pub work_dir: PathBuf,
    pub origins_dir: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_home = temp_dir.path().join("config");
        let work_dir = temp_dir.path().join("work");
        let origins_dir = temp_dir.path().join("origins");
        for dir in [&config_home, &work_dir, &origins_dir] {
            std::fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        Self {
            temp_dir,
            config_home,
            work_dir,
            origins_dir,
        }
    }

    pub fn create_test_config(&self, content: &str) -> PathBuf {
        let config_path = self.temp_dir.path().join("config.yml");
        std::fs::write(&config_path, content).expect("Failed to write test config");
        config_path
    }

    /// Create `origins/<name>.git` with one commit on `main`
    pub fn create_origin(&self, name: &str) -> PathBuf {
        let seed = self.seed_dir(name);
        std::fs::create_dir_all(&seed).expect("Failed to create seed dir");
        git(&seed, &["init", "-q"]);
        git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        std::fs::write(seed.join("README.md"), format!("# {}\n", name))
            .expect("Failed to write README");
        git(&seed, &["add", "README.md"]);
        git(&seed, &["commit", "-q", "-m", "Initial commit"]);

        let bare = self.origins_dir.join(format!("{}.git", name));
        git(
            self.temp_dir.path(),
            &["clone", "-q", "--bare", seed.to_str().unwrap(), bare.to_str().unwrap()],
        );
        git(&seed, &["remote", "add", "origin", bare.to_str().unwrap()]);
        bare
    }

    /// Commit `file` to the origin created by [`Self::create_origin`]
    pub fn push_change(&self, name: &str, file: &str) {
        let seed = self.seed_dir(name);
        std::fs::write(seed.join(file), "change\n").expect("Failed to write change");
        git(&seed, &["add", file]);
        git(&seed, &["commit", "-q", "-m", "Add change"]);
        git(&seed, &["push", "-q", "origin", "main"]);
    }

    /// The orgsync binary, isolated from the caller's environment
    pub fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_orgsync"));
        for var in ISOLATED_VARS {
            command.env_remove(var);
        }
        command
            .env("XDG_CONFIG_HOME", &self.config_home)
            .env("GIT_TERMINAL_PROMPT", "0")
            .current_dir(&self.work_dir);
        command
    }

    fn seed_dir(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join("seeds").join(name)
    }
}
