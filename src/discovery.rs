//! Repository discovery abstraction layer
//!
//! A [`RepoLister`] fetches one page of an organization's repositories at a
//! time. [`repo_pages`] turns it into a lazy stream of pages that ends at the
//! first empty page, so the engine never holds more than one page in memory.

use async_trait::async_trait;
use futures::stream::{self, Stream};
use tracing::{debug, warn};

use crate::error::ListError;
use crate::git::repo_dir_name;

/// Safety net against a server that never returns an empty page
pub const MAX_PAGES: u32 = 1000;

/// A repository as reported by the remote listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDescriptor {
    /// Repository name (e.g., "widget")
    pub name: String,

    /// URL passed to `git clone`, SSH form when the API offers one
    pub clone_url: String,

    /// Default branch, when the listing reports it
    pub default_branch: Option<String>,
}

impl RepoDescriptor {
    pub fn new(name: impl Into<String>, clone_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clone_url: clone_url.into(),
            default_branch: None,
        }
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = Some(branch.into());
        self
    }

    /// Local directory name: last URL segment without `.git`
    pub fn dir_name(&self) -> String {
        let dir = repo_dir_name(&self.clone_url);
        if dir.is_empty() {
            self.name.clone()
        } else {
            dir
        }
    }
}

/// Paginated source of repository descriptors
#[async_trait]
pub trait RepoLister: Send + Sync {
    /// Fetch one page, numbered from 1. An empty page means the listing is over.
    async fn list_page(&self, page: u32) -> Result<Vec<RepoDescriptor>, ListError>;

    /// Name used in log lines
    fn source_name(&self) -> String;
}

enum Cursor {
    Next(u32),
    Done,
}

/// Stream the lister's pages in order, starting at page 1.
///
/// Ends after the first empty page or right after yielding an error; the
/// stream is not restartable.
pub fn repo_pages<'a, L>(
    lister: &'a L,
) -> impl Stream<Item = Result<Vec<RepoDescriptor>, ListError>> + Send + 'a
where
    L: RepoLister + ?Sized,
{
    stream::unfold(Cursor::Next(1), move |cursor| async move {
        let page = match cursor {
            Cursor::Next(page) => page,
            Cursor::Done => return None,
        };

        if page > MAX_PAGES {
            warn!(
                "Reached maximum pagination limit ({} pages) for {}",
                MAX_PAGES,
                lister.source_name()
            );
            return None;
        }

        match lister.list_page(page).await {
            Ok(repos) if repos.is_empty() => {
                debug!("Page {} of {} is empty, listing complete", page, lister.source_name());
                None
            }
            Ok(repos) => {
                debug!(
                    "Page {} of {} returned {} repositories",
                    page,
                    lister.source_name(),
                    repos.len()
                );
                Some((Ok(repos), Cursor::Next(page + 1)))
            }
            Err(e) => Some((Err(e), Cursor::Done)),
        }
    })
}
