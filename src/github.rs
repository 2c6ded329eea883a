use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, warn};

use crate::config::Config;
use crate::discovery::{RepoDescriptor, RepoLister};
use crate::error::ListError;

/// Lists an organization's repositories through the GitHub REST API
pub struct GitHubClient {
    client: Octocrab,
    organization: String,
    per_page: u8,
}

/// Fields of `GET /orgs/{org}/repos` entries that synchronization needs
#[derive(Debug, Deserialize)]
struct OrgRepo {
    name: String,
    ssh_url: Option<String>,
    clone_url: Option<String>,
    default_branch: Option<String>,
}

#[derive(Serialize)]
struct PageQuery {
    per_page: u8,
    page: u32,
}

impl GitHubClient {
    /// Create a client for `organization` authenticated with `token`
    pub fn new(config: &Config, organization: &str, token: String) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token)
            .base_uri(config.github.api_url.as_str())
            .with_context(|| format!("Invalid GitHub API URL: {}", config.github.api_url))?
            .build()
            .context("Failed to create GitHub client")?;

        Ok(Self {
            client,
            organization: organization.to_string(),
            per_page: config.github.per_page.max(1),
        })
    }

    /// Read the access token from the configured environment variable
    pub fn token_from_env(config: &Config) -> Result<String, ListError> {
        let var = &config.github.token_env;
        debug!("Attempting environment variable authentication via {}", var);

        let token = match env::var(var) {
            Ok(token) if !token.trim().is_empty() => token.trim().to_string(),
            _ => return Err(ListError::MissingCredential { var: var.clone() }),
        };

        if !["ghp_", "gho_", "ghs_", "ghu_", "github_pat_"]
            .iter()
            .any(|prefix| token.starts_with(prefix))
        {
            warn!("{} doesn't look like a GitHub token (expected a ghp_, gho_, ghs_, ghu_ or github_pat_ prefix)", var);
        }

        Ok(token)
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    fn to_descriptor(&self, repo: OrgRepo) -> RepoDescriptor {
        // Prefer SSH URL, fall back to clone_url (HTTPS)
        let clone_url = repo
            .ssh_url
            .or(repo.clone_url)
            .unwrap_or_else(|| format!("git@github.com:{}/{}.git", self.organization, repo.name));

        RepoDescriptor {
            name: repo.name,
            clone_url,
            default_branch: repo.default_branch,
        }
    }

    fn classify(&self, page: u32, err: octocrab::Error) -> ListError {
        if let octocrab::Error::GitHub { source, .. } = &err {
            let status = source.status_code.as_u16();
            let rate_limited = source.message.to_lowercase().contains("rate limit");
            if status == 401 || (status == 403 && !rate_limited) {
                return ListError::Authentication {
                    org: self.organization.clone(),
                    status,
                };
            }
        }
        ListError::Transport {
            page,
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl RepoLister for GitHubClient {
    async fn list_page(&self, page: u32) -> Result<Vec<RepoDescriptor>, ListError> {
        debug!(
            "Fetching repositories for organization {} page {}",
            self.organization, page
        );

        let route = format!("/orgs/{}/repos", self.organization);
        let query = PageQuery {
            per_page: self.per_page,
            page,
        };

        // A `null` body is treated like an empty page
        let repos: Option<Vec<OrgRepo>> = self
            .client
            .get(route, Some(&query))
            .await
            .map_err(|e| self.classify(page, e))?;

        Ok(repos
            .unwrap_or_default()
            .into_iter()
            .map(|repo| self.to_descriptor(repo))
            .collect())
    }

    fn source_name(&self) -> String {
        format!("GitHub organization {}", self.organization)
    }
}
