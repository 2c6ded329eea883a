//! orgsync - Mirror every repository of a GitHub organization locally
//!
//! orgsync clones the repositories of an organization that are missing from a
//! local working root and pulls updates for the ones already present, running
//! a bounded number of repository operations at once.
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`discovery`]: Paginated repository listing abstraction
//! - [`github`]: GitHub API integration and authentication
//! - [`filter`]: Exclusion by repository name
//! - [`git`]: Git invocation and per-repository synchronization
//! - [`pool`]: Bounded worker pool
//! - [`outcome`]: Outcome aggregation across workers
//! - [`sync`]: The sync engine tying the above together
//! - [`report`]: Final summary and exit status

pub mod config;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod git;
pub mod github;
pub mod outcome;
pub mod pool;
pub mod report;
pub mod sync;

pub use config::Config;
pub use discovery::{RepoDescriptor, RepoLister};
pub use error::ListError;
pub use filter::ExclusionSet;
pub use git::{GitCli, RepoSynchronizer, Synchronizer};
pub use github::GitHubClient;
pub use outcome::{RunSummary, SyncOutcome};
pub use report::Reporter;
pub use sync::{RunReport, SyncEngine};
