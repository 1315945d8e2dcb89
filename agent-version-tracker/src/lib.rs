#![doc = include_str!("../README.md")]

pub mod publish;
pub mod query;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod snapshot;

pub use publish::{
    GcsStore, LocalStore, MemoryStore, PublishError, PublishMode, Publisher, SnapshotStore,
    StoreError,
};
pub use query::{AliasedRequest, AutoVersionStrategy, QueryPlan};
pub use registry::{Family, ProjectEntry, ProjectKind, Registry, RegistryError};
pub use resolver::{
    extract_version, extract_versions, fetch_release_tags, Extraction, GitHubSource,
    ReleaseSource, ResolveError, ResponseData,
};
pub use runner::{RunReport, Runner, RunnerConfig, RunnerError, DEFAULT_TIMEOUT};
pub use snapshot::{AggregatedSnapshot, VersionField, VersionRecord};
