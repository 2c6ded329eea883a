use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

use crate::discovery::RepoDescriptor;
use crate::outcome::SyncOutcome;

/// Exit code recorded when git could not be run or was killed by a signal
pub const NO_EXIT_CODE: i32 = -1;

pub const CLONE_FAILED: &str = "clone failed";
pub const PULL_FAILED: &str = "pull failed";
pub const GIT_UNAVAILABLE: &str = "could not run git";
pub const NOT_A_REPOSITORY: &str = "target exists but is not a git repository";

/// Exit status and captured output of one git invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub exit_code: i32,
    /// Empty when output was streamed to the terminal
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success() -> Self {
        Self::with_code(0)
    }

    pub fn with_code(exit_code: i32) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(NO_EXIT_CODE)
}

/// Absolute parent of `dir`; git must not search for a repository there
fn ceiling_dir(dir: &Path) -> Option<PathBuf> {
    let parent = dir.parent()?;
    if parent.is_absolute() {
        Some(parent.to_path_buf())
    } else {
        std::env::current_dir()
            .ok()
            .map(|cwd| path_clean::clean(cwd.join(parent)))
    }
}

/// Version-control operations the synchronizer needs.
///
/// `Err` means git could not be started at all; a non-zero exit is an `Ok`
/// [`GitOutput`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Vcs: Send + Sync {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<GitOutput>;

    async fn remote_url(&self, repo: &Path) -> Result<GitOutput>;

    async fn set_remote_url(&self, repo: &Path, url: &str) -> Result<GitOutput>;

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<GitOutput>;

    async fn pull(&self, repo: &Path) -> Result<GitOutput>;
}

/// [`Vcs`] backed by the `git` executable
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    /// Stream git's stdout/stderr to the terminal instead of capturing them
    verbose: bool,
}

impl GitCli {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// `git --version`, used as a preflight check
    pub async fn version(&self) -> Result<String> {
        let output = AsyncCommand::new("git")
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .context("Git not found in PATH")?;

        if !output.status.success() {
            return Err(anyhow!("Git command failed: {}", String::from_utf8_lossy(&output.stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn git<I, S>(&self, cwd: Option<&Path>, args: I) -> Result<GitOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = AsyncCommand::new("git");
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
            // Keep git from walking up into a repository enclosing the working root
            if let Some(ceiling) = ceiling_dir(dir) {
                command.env("GIT_CEILING_DIRECTORIES", ceiling);
            }
        }

        if self.verbose {
            let status = command.status().await.context("Failed to execute git")?;
            return Ok(GitOutput::with_code(exit_code(status)));
        }

        let output = command.output().await.context("Failed to execute git")?;
        Ok(GitOutput {
            exit_code: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<GitOutput> {
        self.git(None, [OsStr::new("clone"), OsStr::new(url), dest.as_os_str()])
            .await
    }

    async fn remote_url(&self, repo: &Path) -> Result<GitOutput> {
        self.git(Some(repo), ["remote", "get-url", "origin"]).await
    }

    async fn set_remote_url(&self, repo: &Path, url: &str) -> Result<GitOutput> {
        self.git(Some(repo), ["remote", "set-url", "origin", url]).await
    }

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<GitOutput> {
        self.git(Some(repo), ["checkout", branch]).await
    }

    async fn pull(&self, repo: &Path) -> Result<GitOutput> {
        self.git(Some(repo), ["pull"]).await
    }
}

/// Brings one local directory in line with one remote repository
#[async_trait]
pub trait Synchronizer: Send + Sync {
    /// Where the working copy for `repo` lives
    fn target_dir(&self, repo: &RepoDescriptor) -> PathBuf;

    async fn sync(&self, repo: &RepoDescriptor) -> SyncOutcome;
}

/// Clone-or-update synchronizer over a [`Vcs`]
pub struct RepoSynchronizer<V> {
    vcs: V,
    root: PathBuf,
    branches: Vec<String>,
}

impl<V: Vcs> RepoSynchronizer<V> {
    pub fn new(vcs: V, root: impl Into<PathBuf>, branches: Vec<String>) -> Self {
        Self {
            vcs,
            root: root.into(),
            branches,
        }
    }

    /// Branches to try, the listing's default branch first
    fn branch_candidates<'a>(&'a self, repo: &'a RepoDescriptor) -> Vec<&'a str> {
        let mut candidates: Vec<&str> = Vec::with_capacity(self.branches.len() + 1);
        for branch in repo
            .default_branch
            .iter()
            .chain(self.branches.iter())
            .map(String::as_str)
        {
            if !candidates.contains(&branch) {
                candidates.push(branch);
            }
        }
        candidates
    }

    async fn clone_into(&self, repo: &RepoDescriptor, dir: &Path) -> SyncOutcome {
        info!("Cloning repository: {} -> {}", repo.name, dir.display());

        // Removes the target unless the clone completes, including when this
        // future is dropped by a timeout
        let mut partial = PartialClone::new(dir);

        match self.vcs.clone_repo(&repo.clone_url, dir).await {
            Ok(output) if output.is_success() => {
                partial.keep();
                info!("Successfully cloned: {}", repo.name);
                SyncOutcome::Success
            }
            Ok(output) => {
                debug!("git clone stderr for {}: {}", repo.name, output.stderr);
                warn!("Clone of {} failed with exit code {}", repo.name, output.exit_code);
                SyncOutcome::failed(CLONE_FAILED, output.exit_code)
            }
            Err(e) => {
                warn!("Could not run git clone for {}: {:#}", repo.name, e);
                SyncOutcome::failed(GIT_UNAVAILABLE, NO_EXIT_CODE)
            }
        }
    }

    async fn update(&self, repo: &RepoDescriptor, dir: &Path) -> SyncOutcome {
        info!("Updating repository: {} at {}", repo.name, dir.display());

        self.normalize_remote(repo, dir).await;
        self.select_branch(repo, dir).await;

        match self.vcs.pull(dir).await {
            Ok(output) if output.is_success() => {
                info!("Successfully pulled: {}", repo.name);
                SyncOutcome::Success
            }
            Ok(output) => {
                debug!("git pull stderr for {}: {}", repo.name, output.stderr);
                warn!("Pull of {} failed with exit code {}", repo.name, output.exit_code);
                SyncOutcome::failed(PULL_FAILED, output.exit_code)
            }
            Err(e) => {
                warn!("Could not run git pull for {}: {:#}", repo.name, e);
                SyncOutcome::failed(GIT_UNAVAILABLE, NO_EXIT_CODE)
            }
        }
    }

    /// Rewrite an HTTPS `origin` to its SSH form. Failures only warn.
    async fn normalize_remote(&self, repo: &RepoDescriptor, dir: &Path) {
        let current = match self.vcs.remote_url(dir).await {
            Ok(output) if output.is_success() => output.stdout,
            Ok(output) => {
                warn!(
                    "Could not read origin URL of {} (exit code {})",
                    repo.name, output.exit_code
                );
                return;
            }
            Err(e) => {
                warn!("Could not read origin URL of {}: {:#}", repo.name, e);
                return;
            }
        };

        let ssh = to_ssh_url(&current);
        if let Cow::Owned(ssh) = ssh {
            info!("Switching {} remote to SSH: {}", repo.name, ssh);
            match self.vcs.set_remote_url(dir, &ssh).await {
                Ok(output) if output.is_success() => {}
                Ok(output) => warn!(
                    "Could not rewrite origin URL of {} (exit code {})",
                    repo.name, output.exit_code
                ),
                Err(e) => warn!("Could not rewrite origin URL of {}: {:#}", repo.name, e),
            }
        }
    }

    /// Check out the first candidate branch that exists. Never fatal.
    async fn select_branch(&self, repo: &RepoDescriptor, dir: &Path) {
        let candidates = self.branch_candidates(repo);
        for branch in &candidates {
            match self.vcs.checkout(dir, branch).await {
                Ok(output) if output.is_success() => {
                    debug!("Checked out {} in {}", branch, repo.name);
                    return;
                }
                Ok(output) => debug!(
                    "Checkout of {} in {} failed with exit code {}",
                    branch, repo.name, output.exit_code
                ),
                Err(e) => debug!("Could not run git checkout in {}: {:#}", repo.name, e),
            }
        }
        warn!(
            "None of the branches {:?} could be checked out in {}, pulling current HEAD",
            candidates, repo.name
        );
    }
}

#[async_trait]
impl<V: Vcs> Synchronizer for RepoSynchronizer<V> {
    fn target_dir(&self, repo: &RepoDescriptor) -> PathBuf {
        self.root.join(repo.dir_name())
    }

    async fn sync(&self, repo: &RepoDescriptor) -> SyncOutcome {
        let dir = self.target_dir(repo);

        match TargetState::inspect(&dir).await {
            TargetState::Missing | TargetState::EmptyDir => self.clone_into(repo, &dir).await,
            TargetState::WorkingCopy => self.update(repo, &dir).await,
            TargetState::Occupied => {
                warn!(
                    "{} exists but is not a git working copy, leaving it untouched",
                    dir.display()
                );
                SyncOutcome::failed(NOT_A_REPOSITORY, NO_EXIT_CODE)
            }
        }
    }
}

/// What currently sits at a repository's target path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetState {
    Missing,
    EmptyDir,
    WorkingCopy,
    /// A file, or a non-empty directory without `.git`
    Occupied,
}

impl TargetState {
    async fn inspect(dir: &Path) -> Self {
        let meta = match tokio::fs::metadata(dir).await {
            Ok(meta) => meta,
            Err(_) => return TargetState::Missing,
        };
        if !meta.is_dir() {
            return TargetState::Occupied;
        }

        // `.git` may be a file for worktrees and submodules
        if tokio::fs::metadata(dir.join(".git")).await.is_ok() {
            return TargetState::WorkingCopy;
        }

        match tokio::fs::read_dir(dir).await {
            Ok(mut entries) => match entries.next_entry().await {
                Ok(None) => TargetState::EmptyDir,
                _ => TargetState::Occupied,
            },
            Err(_) => TargetState::Occupied,
        }
    }
}

/// Deletes a clone target on drop unless [`PartialClone::keep`] was called
struct PartialClone<'a> {
    dir: &'a Path,
    keep: bool,
}

impl<'a> PartialClone<'a> {
    fn new(dir: &'a Path) -> Self {
        Self { dir, keep: false }
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialClone<'_> {
    fn drop(&mut self) {
        if self.keep || !self.dir.is_dir() {
            return;
        }
        debug!("Removing incomplete clone at {}", self.dir.display());
        if let Err(e) = std::fs::remove_dir_all(self.dir) {
            warn!("Could not remove incomplete clone at {}: {}", self.dir.display(), e);
        }
    }
}

/// Final URL path segment with a trailing `.git` removed
pub fn repo_dir_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

/// Rewrite `https://HOST/PATH` to `git@HOST:PATH`; any other URL is returned
/// unchanged, so applying it twice is a no-op.
pub fn to_ssh_url(url: &str) -> Cow<'_, str> {
    let Some(rest) = url.strip_prefix("https://") else {
        return Cow::Borrowed(url);
    };

    match rest.split_once('/') {
        Some((authority, path)) if !authority.is_empty() && !path.is_empty() => {
            // drop any user:token@ prefix
            let host = authority.rsplit('@').next().unwrap_or(authority);
            Cow::Owned(format!("git@{}:{}", host, path))
        }
        _ => Cow::Borrowed(url),
    }
}
