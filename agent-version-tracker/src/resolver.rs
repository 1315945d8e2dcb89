//! Query execution and version extraction.
//!
//! One refresh cycle is a single GraphQL round trip: the composite query
//! from [`QueryPlan`](crate::query::QueryPlan) goes out once, and every
//! aliased fragment of the response is mapped back through the plan's alias
//! table. Extraction is pure and lenient per entry: a missing alias, a
//! malformed fragment, an empty release list, or a tag the pattern does not
//! match each leave that entry's fields absent without failing the run.

use crate::query::QueryPlan;
use crate::snapshot::AggregatedSnapshot;
use async_trait::async_trait;
use octocrab::Octocrab;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a refresh cycle before anything is published.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The request could not be completed.
    #[error("GraphQL request failed: {0}")]
    Transport(#[source] octocrab::Error),

    /// GitHub rejected the supplied credential.
    #[error("GitHub rejected the credential (HTTP {status})")]
    Auth { status: u16 },

    /// The response body does not carry the expected structure.
    #[error("malformed GraphQL response: {message}")]
    MalformedResponse { message: String },
}

/// Per-alias response fragments, keyed by alias.
pub type ResponseData = HashMap<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ResponseData>,
}

/// The typed shape of one aliased repository fragment.
///
/// Fragments are deserialized individually so one malformed entry cannot
/// poison the rest of the response.
#[derive(Debug, Deserialize)]
struct RepositoryFragment {
    name: String,
    releases: ReleaseConnection,
}

#[derive(Debug, Deserialize)]
struct ReleaseConnection {
    #[serde(default)]
    nodes: Vec<ReleaseNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseNode {
    tag_name: String,
}

/// The outbound query capability: one composite request in, per-alias
/// fragments out.
///
/// [`GitHubSource`] is the production implementation; tests inject fixture
/// data or simulated failures instead.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Executes the composite query once.
    async fn fetch(&self, plan: &QueryPlan) -> Result<ResponseData, ResolveError>;
}

/// The GitHub GraphQL endpoint as a [`ReleaseSource`].
pub struct GitHubSource {
    octocrab: Octocrab,
}

impl GitHubSource {
    /// Builds an authenticated source with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`octocrab::Error`] if the client cannot be constructed.
    pub fn new(token: &str, timeout: Duration) -> Result<Self, octocrab::Error> {
        let octocrab = Octocrab::builder()
            .personal_token(token.to_string())
            .set_connect_timeout(Some(timeout))
            .set_read_timeout(Some(timeout))
            .build()?;
        Ok(Self { octocrab })
    }
}

#[async_trait]
impl ReleaseSource for GitHubSource {
    async fn fetch(&self, plan: &QueryPlan) -> Result<ResponseData, ResolveError> {
        fetch_release_tags(&self.octocrab, plan).await
    }
}

/// Executes the composite query and returns the per-alias fragments.
///
/// This is the cycle's only outbound GitHub request. HTTP 401/403 map to
/// [`ResolveError::Auth`], other request failures to
/// [`ResolveError::Transport`], and a body without a `data` object to
/// [`ResolveError::MalformedResponse`]. All three are fatal for the run.
pub async fn fetch_release_tags(
    octocrab: &Octocrab,
    plan: &QueryPlan,
) -> Result<ResponseData, ResolveError> {
    debug!(repositories = plan.requests.len(), "Executing composite release query");

    let payload = serde_json::json!({ "query": plan.document });
    let response: serde_json::Value = match octocrab.graphql(&payload).await {
        Ok(response) => response,
        Err(octocrab::Error::GitHub { source, .. })
            if matches!(source.status_code.as_u16(), 401 | 403) =>
        {
            return Err(ResolveError::Auth {
                status: source.status_code.as_u16(),
            });
        }
        Err(e) => return Err(ResolveError::Transport(e)),
    };

    let parsed: GraphQlResponse =
        serde_json::from_value(response).map_err(|e| ResolveError::MalformedResponse {
            message: e.to_string(),
        })?;

    parsed.data.ok_or_else(|| ResolveError::MalformedResponse {
        message: "response has no `data` object".to_string(),
    })
}

/// Applies a tag pattern with first-match, first-capture semantics.
///
/// Returns the first capturing group of the first match, or `None` when the
/// pattern does not match at all. Never errors: patterns are validated to
/// carry a capturing group at registry construction.
pub fn extract_version(pattern: &Regex, tag: &str) -> Option<String> {
    pattern
        .captures(tag)
        .and_then(|captures| captures.get(1))
        .map(|capture| capture.as_str().to_string())
}

/// Outcome of mapping one response through the alias table.
#[derive(Debug)]
pub struct Extraction {
    /// The complete snapshot, one record per registry entry.
    pub snapshot: AggregatedSnapshot,
    /// Sub-requests whose tag matched and yielded a version.
    pub resolved: usize,
    /// Sub-requests left absent (no releases, missing fragment, or
    /// non-matching tag).
    pub misses: usize,
}

/// Maps response fragments back through the alias table into a snapshot.
///
/// Every request in the plan contributes a record of its family's shape,
/// even when nothing could be extracted, so the published document always
/// carries the full key set. Deterministic: identical plan and data yield
/// an identical snapshot.
pub fn extract_versions(plan: &QueryPlan, data: &ResponseData) -> Extraction {
    let mut snapshot = AggregatedSnapshot::new();
    let mut resolved = 0;
    let mut misses = 0;

    for request in &plan.requests {
        snapshot.entry(&request.display_name, request.family);

        let Some(fragment) = data.get(&request.alias) else {
            warn!(
                alias = %request.alias,
                project = %request.display_name,
                "Response is missing this alias, leaving fields absent"
            );
            misses += 1;
            continue;
        };

        let fragment: RepositoryFragment = match serde_json::from_value(fragment.clone()) {
            Ok(fragment) => fragment,
            Err(e) => {
                warn!(
                    alias = %request.alias,
                    project = %request.display_name,
                    error = %e,
                    "Skipping malformed response fragment"
                );
                misses += 1;
                continue;
            }
        };

        let Some(node) = fragment.releases.nodes.first() else {
            debug!(
                repo = %fragment.name,
                project = %request.display_name,
                "Repository has no releases yet"
            );
            misses += 1;
            continue;
        };

        match extract_version(&request.tag_pattern, &node.tag_name) {
            Some(version) => {
                debug!(
                    repo = %fragment.name,
                    project = %request.display_name,
                    tag = %node.tag_name,
                    version = %version,
                    "Extracted version"
                );
                let record = snapshot.entry(&request.display_name, request.family);
                for target in &request.targets {
                    record.assign(*target, version.clone());
                }
                resolved += 1;
            }
            None => {
                warn!(
                    repo = %fragment.name,
                    project = %request.display_name,
                    tag = %node.tag_name,
                    pattern = %request.tag_pattern,
                    "Tag did not match the configured pattern"
                );
                misses += 1;
            }
        }
    }

    info!(
        projects = snapshot.len(),
        resolved, misses, "Extraction complete"
    );

    Extraction {
        snapshot,
        resolved,
        misses,
    }
}
