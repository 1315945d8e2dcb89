//! Composite GraphQL query construction.
//!
//! One refresh cycle issues a single GraphQL request covering every tracked
//! repository. Each repository becomes an aliased sub-query (`repo0`,
//! `repo1`, ...); the alias table is built alongside the document so that
//! response fragments are correlated back to registry entries explicitly,
//! never by response key order.

use crate::registry::{Family, ProjectKind, Registry};
use crate::snapshot::VersionField;
use regex::Regex;
use std::fmt::Write;

/// How the `auto_latest_version` field of telemetry entries is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoVersionStrategy {
    /// Mirror the SDK repository's version into both telemetry fields.
    ///
    /// This reproduces the historical collector: the auto-instrumentation
    /// repository is configured but never queried on its own.
    #[default]
    MirrorSdk,

    /// Issue a separate sub-query for each configured auto-instrumentation
    /// repository and fill `auto_latest_version` from its own tag. Entries
    /// without an auto repository fall back to mirroring the SDK version.
    QueryAutoRepo,
}

/// One aliased sub-request within the composite query.
#[derive(Debug, Clone)]
pub struct AliasedRequest {
    /// Unique alias correlating the response fragment back to this request.
    pub alias: String,
    /// Display name of the registry entry this request belongs to.
    pub display_name: String,
    /// Family of that entry, selecting the output record shape.
    pub family: Family,
    /// Owning GitHub organization.
    pub owner: &'static str,
    /// Repository queried for its most recent release.
    pub repo: String,
    /// Pattern extracting the version from the release tag.
    pub tag_pattern: Regex,
    /// Output fields the extracted version is written to.
    pub targets: Vec<VersionField>,
}

/// The composite query document plus its alias table.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// The GraphQL document requesting the latest release tag per alias.
    pub document: String,
    /// Requests in alias order; extraction walks this table, not the
    /// response keys.
    pub requests: Vec<AliasedRequest>,
}

impl QueryPlan {
    /// Builds the composite query for every entry in the registry.
    ///
    /// Aliases are positional and derived from the registry's stable entry
    /// order, so the same registry always produces the same document.
    pub fn build(registry: &Registry, strategy: AutoVersionStrategy) -> Self {
        let mut requests = Vec::new();

        for entry in registry.entries() {
            match &entry.kind {
                ProjectKind::Agent { repo, tag_pattern } => {
                    requests.push(AliasedRequest {
                        alias: format!("repo{}", requests.len()),
                        display_name: entry.display_name.clone(),
                        family: Family::Agent,
                        owner: entry.owner(),
                        repo: repo.clone(),
                        tag_pattern: tag_pattern.clone(),
                        targets: vec![VersionField::Latest],
                    });
                }
                ProjectKind::TelemetrySdk {
                    sdk_repo,
                    sdk_tag_pattern,
                    auto_repo,
                    auto_tag_pattern,
                } => {
                    let query_auto = strategy == AutoVersionStrategy::QueryAutoRepo
                        && auto_repo.is_some()
                        && auto_tag_pattern.is_some();

                    let sdk_targets = if query_auto {
                        vec![VersionField::Sdk]
                    } else {
                        vec![VersionField::Sdk, VersionField::Auto]
                    };
                    requests.push(AliasedRequest {
                        alias: format!("repo{}", requests.len()),
                        display_name: entry.display_name.clone(),
                        family: Family::TelemetrySdk,
                        owner: entry.owner(),
                        repo: sdk_repo.clone(),
                        tag_pattern: sdk_tag_pattern.clone(),
                        targets: sdk_targets,
                    });

                    if query_auto {
                        requests.push(AliasedRequest {
                            alias: format!("repo{}", requests.len()),
                            display_name: entry.display_name.clone(),
                            family: Family::TelemetrySdk,
                            owner: entry.owner(),
                            repo: auto_repo.clone().unwrap(),
                            tag_pattern: auto_tag_pattern.clone().unwrap(),
                            targets: vec![VersionField::Auto],
                        });
                    }
                }
            }
        }

        let document = render_document(&requests);
        Self { document, requests }
    }
}

/// Renders the composite document from the alias table.
fn render_document(requests: &[AliasedRequest]) -> String {
    let mut document = String::from("query {\n");
    for request in requests {
        // Owner and repository names come from the compiled-in registry,
        // not from user input, so plain interpolation is safe here.
        write!(
            document,
            "  {}: repository(owner: \"{}\", name: \"{}\") {{ name releases(first: 1) {{ nodes {{ tagName }} }} }}\n",
            request.alias, request.owner, request.repo
        )
        .expect("writing to a String cannot fail");
    }
    document.push('}');
    document
}
