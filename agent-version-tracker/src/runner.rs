//! Orchestrates one full refresh cycle.

use crate::publish::{PublishError, Publisher};
use crate::query::{AutoVersionStrategy, QueryPlan};
use crate::registry::Registry;
use crate::resolver::{extract_versions, GitHubSource, ReleaseSource, ResolveError};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default bound on the outbound API call, matching the storage-side
/// default. The invoking trigger usually enforces its own outer deadline on
/// top of this.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for one refresh cycle.
#[derive(Clone)]
pub struct RunnerConfig {
    /// GitHub token used for the GraphQL call. Never logged.
    token: String,
    /// How telemetry auto-instrumentation versions are resolved.
    strategy: AutoVersionStrategy,
    /// Bound on the outbound API call.
    timeout: Duration,
}

impl RunnerConfig {
    /// Creates a configuration with the default strategy and timeout.
    pub fn new(token: String) -> Self {
        Self {
            token,
            strategy: AutoVersionStrategy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Selects the auto-instrumentation version strategy.
    pub fn with_auto_version_strategy(mut self, strategy: AutoVersionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the outbound request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the configured strategy.
    pub fn strategy(&self) -> AutoVersionStrategy {
        self.strategy
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

// The token must never reach the logs.
impl std::fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("token", &"<redacted>")
            .field("strategy", &self.strategy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Errors that fail a refresh cycle.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// GitHub client initialization errors.
    #[error(transparent)]
    Octocrab(#[from] octocrab::Error),

    /// Query execution errors.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Snapshot publishing errors.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Counters describing a completed cycle.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Projects in the registry.
    pub projects_tracked: usize,
    /// Aliased sub-requests in the composite query.
    pub sub_requests: usize,
    /// Sub-requests that yielded a version.
    pub versions_resolved: usize,
    /// Sub-requests left absent.
    pub extraction_misses: usize,
}

/// Runs the full pipeline: build query, fetch, extract, publish.
pub struct Runner {
    registry: Registry,
    config: RunnerConfig,
    source: Box<dyn ReleaseSource>,
    publisher: Publisher,
}

impl Runner {
    /// Builds a runner querying GitHub with the configured token.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Octocrab`] if the GitHub client cannot be
    /// constructed.
    pub fn new(
        registry: Registry,
        config: RunnerConfig,
        publisher: Publisher,
    ) -> Result<Self, RunnerError> {
        let source = GitHubSource::new(&config.token, config.timeout)?;
        Ok(Self::with_source(registry, config, Box::new(source), publisher))
    }

    /// Builds a runner with an injected release source.
    pub fn with_source(
        registry: Registry,
        config: RunnerConfig,
        source: Box<dyn ReleaseSource>,
        publisher: Publisher,
    ) -> Self {
        Self {
            registry,
            config,
            source,
            publisher,
        }
    }

    /// Executes one refresh cycle to completion.
    ///
    /// Per-entry extraction misses are tolerated and counted; any transport,
    /// authentication, response-shape, or storage failure aborts the run
    /// before (or instead of) the publish step. The snapshot is published
    /// exactly once, complete, or not at all.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] on any fatal failure; the caller surfaces it
    /// through the trigger's failure channel.
    pub async fn run(&self) -> Result<RunReport, RunnerError> {
        let plan = QueryPlan::build(&self.registry, self.config.strategy);
        info!(
            projects = self.registry.len(),
            sub_requests = plan.requests.len(),
            strategy = ?self.config.strategy,
            "Starting refresh cycle"
        );

        let data = self.source.fetch(&plan).await?;
        let extraction = extract_versions(&plan, &data);
        self.publisher.publish(&extraction.snapshot).await?;

        let report = RunReport {
            projects_tracked: self.registry.len(),
            sub_requests: plan.requests.len(),
            versions_resolved: extraction.resolved,
            extraction_misses: extraction.misses,
        };
        info!(
            resolved = report.versions_resolved,
            misses = report.extraction_misses,
            "Refresh cycle complete"
        );
        Ok(report)
    }
}
