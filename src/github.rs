use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{StatusCode, Url};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::{self, BlobRow, PendingBlob};
use crate::settings::Settings;

const API_ACCEPT: &str = "application/vnd.github+json";
const AGENT: &str = concat!("snippet-catalog/", env!("CARGO_PKG_VERSION"));

/// A fetch that failed after the retry budget, or could never succeed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Rate limiting, server errors, timeouts. Worth retrying later.
    #[error("{path}: {message} (gave up after {attempts} attempts)")]
    Transient {
        path: String,
        message: String,
        attempts: u32,
    },

    /// Any other failure: not found, bad request, undecodable body.
    #[error("{path}: {message}")]
    Fatal {
        path: String,
        status: Option<u16>,
        message: String,
        attempts: u32,
    },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::Transient { attempts, .. } | FetchError::Fatal { attempts, .. } => *attempts,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Transient { .. } => None,
            FetchError::Fatal { status, .. } => *status,
        }
    }
}

/// Body of a successful fetch.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub text: String,
    pub status: u16,
    pub attempts: u32,
}

/// One node of the recursive tree listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeNode {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeNode>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

/// Rate limits and server errors are retried; everything else is final.
pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Exponential backoff for the given zero-based retry, capped.
pub fn backoff_delay(retry: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(cap_ms))
}

/// Handle on the GitHub API and raw-content host for one repository.
/// Built once from settings and passed to whoever needs to fetch.
pub struct GithubClient {
    http: reqwest::Client,
    owner: String,
    repo: String,
    branch: String,
    api_base: String,
    raw_base: String,
    max_retries: u32,
    backoff_base_ms: u64,
    backoff_cap_ms: u64,
}

impl GithubClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(AGENT));
        if let Some(token) = &settings.github_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("GitHub token is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            warn!("No GitHub token configured; unauthenticated requests are heavily rate limited");
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            owner: settings.owner.clone(),
            repo: settings.repo.clone(),
            branch: settings.branch.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            raw_base: settings.raw_base.clone(),
            max_retries: settings.max_retries,
            backoff_base_ms: settings.backoff_base_ms,
            backoff_cap_ms: settings.backoff_cap_ms,
        })
    }

    /// Head commit of the configured branch.
    pub async fn branch_sha(&self) -> Result<String> {
        let url = format!(
            "{}/repos/{}/{}/branches/{}",
            self.api_base, self.owner, self.repo, self.branch
        );
        let branch: BranchResponse = self.get_json(&url, &self.branch).await?;
        Ok(branch.commit.sha)
    }

    /// Every entry below the commit, recursively.
    pub async fn list_tree(&self, sha: &str) -> Result<Vec<TreeNode>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, self.owner, self.repo, sha
        );
        let listing: TreeResponse = self.get_json(&url, sha).await?;
        if listing.truncated {
            warn!("Tree listing for {} was truncated by the API; some paths are missing", sha);
        }
        Ok(listing.tree)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, label: &str) -> Result<T> {
        let url = Url::parse(url).with_context(|| format!("Bad API url {}", url))?;
        let fetched = self.get_with_retry(url, label, Some(API_ACCEPT)).await?;
        serde_json::from_str(&fetched.text).with_context(|| format!("Unexpected API response for {}", label))
    }

    /// Raw file content at the branch head.
    pub async fn fetch_raw(&self, path: &str) -> Result<Fetched, FetchError> {
        let url = self.raw_url(path).ok_or_else(|| FetchError::Fatal {
            path: path.to_string(),
            status: None,
            message: format!("cannot build raw url from {}", self.raw_base),
            attempts: 0,
        })?;
        self.get_with_retry(url, path, None).await
    }

    fn raw_url(&self, path: &str) -> Option<Url> {
        let mut url = Url::parse(&self.raw_base).ok()?;
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend([self.owner.as_str(), self.repo.as_str(), self.branch.as_str()])
            .extend(path.split('/'));
        Some(url)
    }

    async fn get_with_retry(&self, url: Url, path: &str, accept: Option<&str>) -> Result<Fetched, FetchError> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let mut request = self.http.get(url.clone());
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }

            let reason = match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let status = resp.status().as_u16();
                    match resp.text().await {
                        Ok(text) => return Ok(Fetched { text, status, attempts }),
                        Err(e) if e.is_decode() => {
                            return Err(FetchError::Fatal {
                                path: path.to_string(),
                                status: Some(status),
                                message: format!("undecodable body: {}", e),
                                attempts,
                            })
                        }
                        Err(e) => format!("body read failed: {}", e),
                    }
                }
                Ok(resp) if is_retryable(resp.status()) => format!("HTTP {}", resp.status()),
                Ok(resp) => {
                    return Err(FetchError::Fatal {
                        path: path.to_string(),
                        status: Some(resp.status().as_u16()),
                        message: format!("HTTP {}", resp.status()),
                        attempts,
                    })
                }
                Err(e) if e.is_builder() => {
                    return Err(FetchError::Fatal {
                        path: path.to_string(),
                        status: None,
                        message: e.to_string(),
                        attempts,
                    })
                }
                Err(e) => e.to_string(),
            };

            if attempts > self.max_retries {
                return Err(FetchError::Transient {
                    path: path.to_string(),
                    message: reason,
                    attempts,
                });
            }

            let backoff = backoff_delay(attempts - 1, self.backoff_base_ms, self.backoff_cap_ms);
            warn!(
                "{} on {} (attempt {}/{}), backing off {:.1}s",
                reason,
                path,
                attempts,
                self.max_retries + 1,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub transient: usize,
    pub fatal: usize,
}

/// Fetch paths concurrently, saving each result to the DB as it arrives.
/// A failed path is stored with its error and never stops the others.
pub async fn fetch_blobs_streaming(
    conn: &Connection,
    client: Arc<GithubClient>,
    paths: Vec<PendingBlob>,
    concurrency: usize,
) -> Result<FetchStats> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = paths.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Workers send results, this loop saves them
    let (tx, mut rx) = tokio::sync::mpsc::channel::<BlobRow>(concurrency.max(1) * 2);

    for PendingBlob { path, sha } in paths {
        let client = Arc::clone(&client);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let start = Instant::now();
            let result = client.fetch_raw(&path).await;
            let latency_ms = start.elapsed().as_millis() as i64;
            let row = match result {
                Ok(fetched) => BlobRow {
                    path,
                    sha,
                    text: Some(fetched.text),
                    status: Some(fetched.status),
                    error: None,
                    transient: false,
                    attempts: fetched.attempts,
                    latency_ms,
                },
                Err(e) => {
                    warn!("Fetch failed: {}", e);
                    BlobRow {
                        path,
                        sha,
                        text: None,
                        status: e.status(),
                        transient: e.is_transient(),
                        attempts: e.attempts(),
                        error: Some(e.to_string()),
                        latency_ms,
                    }
                }
            };
            let _ = tx.send(row).await;
        });
    }

    // rx closes once every task has dropped its sender
    drop(tx);

    let mut stats = FetchStats {
        total,
        ok: 0,
        transient: 0,
        fatal: 0,
    };
    let mut stmt = conn.prepare(db::UPSERT_BLOB)?;

    while let Some(row) = rx.recv().await {
        match (&row.error, row.transient) {
            (None, _) => stats.ok += 1,
            (Some(_), true) => stats.transient += 1,
            (Some(_), false) => stats.fatal += 1,
        }
        db::save_blob(&mut stmt, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Fetched {} files ({} ok, {} transient, {} fatal)",
        total, stats.ok, stats.transient, stats.fatal
    );

    Ok(stats)
}

// ── Tests ──
