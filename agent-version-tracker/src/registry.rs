//! The immutable registry of tracked projects.
//!
//! Every project the tracker follows is described here: its display name
//! (the key downstream consumers see), which family it belongs to, the
//! repository (or repositories) holding its releases, and the tag pattern
//! used to pull a bare version number out of a release tag.
//!
//! The registry is built once at startup and never mutated. Tag patterns
//! are compiled and validated at construction time; an entry with a bad
//! pattern is logged and dropped without taking down the rest.

use regex::Regex;
use thiserror::Error;
use tracing::warn;

/// Errors produced while validating a registry entry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The tag pattern is not a valid regular expression.
    #[error("invalid tag pattern '{pattern}' for '{display_name}': {source}")]
    InvalidPattern {
        display_name: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The tag pattern compiled but captures nothing.
    #[error("tag pattern '{pattern}' for '{display_name}' has no capturing group")]
    MissingCaptureGroup {
        display_name: String,
        pattern: String,
    },
}

/// Which family a tracked project belongs to.
///
/// The family determines the owning GitHub organization and the shape of
/// the project's record in the published document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// An Elastic APM language agent.
    Agent,
    /// An OpenTelemetry SDK, optionally paired with an auto-instrumentation
    /// repository.
    TelemetrySdk,
}

impl Family {
    /// Returns the GitHub organization owning repositories of this family.
    pub fn owner(self) -> &'static str {
        match self {
            Family::Agent => "elastic",
            Family::TelemetrySdk => "open-telemetry",
        }
    }
}

/// Family-specific repository configuration for a tracked project.
#[derive(Debug, Clone)]
pub enum ProjectKind {
    /// A language agent: one repository, one tag pattern.
    Agent { repo: String, tag_pattern: Regex },

    /// A telemetry SDK, with an optional independently-released
    /// auto-instrumentation repository.
    TelemetrySdk {
        sdk_repo: String,
        sdk_tag_pattern: Regex,
        auto_repo: Option<String>,
        auto_tag_pattern: Option<Regex>,
    },
}

/// One tracked project.
#[derive(Debug, Clone)]
pub struct ProjectEntry {
    /// The key used for this project in the published document.
    pub display_name: String,
    /// Family-specific repository configuration.
    pub kind: ProjectKind,
}

impl ProjectEntry {
    /// Creates an agent-family entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the tag pattern does not compile or has
    /// no capturing group.
    pub fn agent(
        display_name: &str,
        repo: &str,
        tag_pattern: &str,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            display_name: display_name.to_string(),
            kind: ProjectKind::Agent {
                repo: repo.to_string(),
                tag_pattern: compile_tag_pattern(display_name, tag_pattern)?,
            },
        })
    }

    /// Creates a telemetry-SDK entry without an auto-instrumentation
    /// repository.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the tag pattern does not compile or has
    /// no capturing group.
    pub fn telemetry_sdk(
        display_name: &str,
        sdk_repo: &str,
        sdk_tag_pattern: &str,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            display_name: display_name.to_string(),
            kind: ProjectKind::TelemetrySdk {
                sdk_repo: sdk_repo.to_string(),
                sdk_tag_pattern: compile_tag_pattern(display_name, sdk_tag_pattern)?,
                auto_repo: None,
                auto_tag_pattern: None,
            },
        })
    }

    /// Creates a telemetry-SDK entry paired with an auto-instrumentation
    /// repository and its own tag pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if either tag pattern does not compile or
    /// has no capturing group.
    pub fn telemetry_sdk_with_auto(
        display_name: &str,
        sdk_repo: &str,
        sdk_tag_pattern: &str,
        auto_repo: &str,
        auto_tag_pattern: &str,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            display_name: display_name.to_string(),
            kind: ProjectKind::TelemetrySdk {
                sdk_repo: sdk_repo.to_string(),
                sdk_tag_pattern: compile_tag_pattern(display_name, sdk_tag_pattern)?,
                auto_repo: Some(auto_repo.to_string()),
                auto_tag_pattern: Some(compile_tag_pattern(display_name, auto_tag_pattern)?),
            },
        })
    }

    /// Returns this project's family.
    pub fn family(&self) -> Family {
        match self.kind {
            ProjectKind::Agent { .. } => Family::Agent,
            ProjectKind::TelemetrySdk { .. } => Family::TelemetrySdk,
        }
    }

    /// Returns the GitHub organization owning this project's repositories.
    pub fn owner(&self) -> &'static str {
        self.family().owner()
    }
}

/// Compiles a tag pattern and verifies it has at least one capturing group.
///
/// Extraction reads the first capture of the first match, so a pattern
/// without a group could never yield a version.
fn compile_tag_pattern(display_name: &str, pattern: &str) -> Result<Regex, RegistryError> {
    let regex = Regex::new(pattern).map_err(|source| RegistryError::InvalidPattern {
        display_name: display_name.to_string(),
        pattern: pattern.to_string(),
        source,
    })?;

    // captures_len() counts the implicit whole-match group.
    if regex.captures_len() < 2 {
        return Err(RegistryError::MissingCaptureGroup {
            display_name: display_name.to_string(),
            pattern: pattern.to_string(),
        });
    }

    Ok(regex)
}

/// The ordered, immutable set of tracked projects.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: Vec<ProjectEntry>,
}

impl Registry {
    /// Builds a registry from entry construction results.
    ///
    /// Entries that failed validation are logged as warnings and skipped;
    /// one bad pattern never takes down the rest of the table.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = Result<ProjectEntry, RegistryError>>,
    {
        let entries = entries
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping invalid registry entry");
                    None
                }
            })
            .collect();
        Self { entries }
    }

    /// The built-in table of tracked projects: the Elastic APM language
    /// agents and the OpenTelemetry SDKs.
    pub fn builtin() -> Self {
        Self::from_entries([
            ProjectEntry::agent("java", "apm-agent-java", "v(.*)"),
            ProjectEntry::agent("dotnet", "apm-agent-dotnet", "v(.*)"),
            ProjectEntry::agent("nodejs", "apm-agent-nodejs", "v(.*)"),
            ProjectEntry::agent("python", "apm-agent-python", "v(.*)"),
            ProjectEntry::agent("go", "apm-agent-go", "v(.*)"),
            ProjectEntry::agent("php", "apm-agent-php", "v(.*)"),
            ProjectEntry::agent("iOS/swift", "apm-agent-ios", "v(.*)"),
            ProjectEntry::agent("js-base", "apm-agent-rum-js", "@elastic/apm-rum@(.*)"),
            ProjectEntry::agent("rum-js", "apm-agent-rum-js", "@elastic/apm-rum@(.*)"),
            ProjectEntry::agent("ruby", "apm-agent-ruby", "v(.*)"),
            ProjectEntry::agent("android/java", "apm-agent-android", "v(.*)"),
            ProjectEntry::telemetry_sdk_with_auto(
                "opentelemetry/java",
                "opentelemetry-java",
                "v(.*)",
                "opentelemetry-java-instrumentation",
                "v(.*)",
            ),
            ProjectEntry::telemetry_sdk_with_auto(
                "opentelemetry/dotnet",
                "opentelemetry-dotnet",
                "Instrumentation.AspNetCore-(.*)",
                "opentelemetry-dotnet-instrumentation",
                "v(.*)",
            ),
            ProjectEntry::telemetry_sdk("opentelemetry/nodejs", "opentelemetry-js", "v(.*)"),
            ProjectEntry::telemetry_sdk("opentelemetry/python", "opentelemetry-python", "v(.*)"),
            ProjectEntry::telemetry_sdk(
                "opentelemetry/ruby",
                "opentelemetry-ruby",
                "opentelemetry-propagator-jaeger/v(.*)",
            ),
            ProjectEntry::telemetry_sdk("opentelemetry/go", "opentelemetry-go", "v(.*)"),
            ProjectEntry::telemetry_sdk_with_auto(
                "opentelemetry/php",
                "opentelemetry-php",
                "(.*)",
                "opentelemetry-php-instrumentation",
                "(.*)",
            ),
            ProjectEntry::telemetry_sdk("opentelemetry/cpp", "opentelemetry-cpp", "v(.*)"),
            ProjectEntry::telemetry_sdk("opentelemetry/erlang", "opentelemetry-erlang", "v(.*)"),
            ProjectEntry::telemetry_sdk("opentelemetry/swift", "opentelemetry-swift", "(.*)"),
            ProjectEntry::telemetry_sdk("opentelemetry/webjs", "opentelemetry-js", "v(.*)"),
        ])
    }

    /// Returns the entries in their stable declaration order.
    ///
    /// Query aliases are assigned positionally from this order, so it must
    /// be deterministic across runs.
    pub fn entries(&self) -> &[ProjectEntry] {
        &self.entries
    }

    /// Looks up an entry by display name.
    pub fn resolve(&self, display_name: &str) -> Option<&ProjectEntry> {
        self.entries
            .iter()
            .find(|entry| entry.display_name == display_name)
    }

    /// Number of tracked projects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no projects.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
