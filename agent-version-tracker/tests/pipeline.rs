//! End-to-end pipeline tests against fixture responses and the in-memory
//! store: registry → query plan → extraction → publish.

use agent_version_tracker::{
    AutoVersionStrategy, MemoryStore, ProjectEntry, Publisher, QueryPlan, Registry, ReleaseSource,
    ResolveError, ResponseData, Runner, RunnerConfig,
};
use async_trait::async_trait;

/// A release source serving a fixed response.
struct StaticSource(ResponseData);

#[async_trait]
impl ReleaseSource for StaticSource {
    async fn fetch(&self, _plan: &QueryPlan) -> Result<ResponseData, ResolveError> {
        Ok(self.0.clone())
    }
}

/// A release source failing with a fatal error.
struct FailingSource(fn() -> ResolveError);

#[async_trait]
impl ReleaseSource for FailingSource {
    async fn fetch(&self, _plan: &QueryPlan) -> Result<ResponseData, ResolveError> {
        Err((self.0)())
    }
}

fn fragment(name: &str, tags: &[&str]) -> serde_json::Value {
    let nodes: Vec<_> = tags
        .iter()
        .map(|tag| serde_json::json!({ "tagName": tag }))
        .collect();
    serde_json::json!({ "name": name, "releases": { "nodes": nodes } })
}

fn runner(
    registry: Registry,
    strategy: AutoVersionStrategy,
    data: ResponseData,
    store: &MemoryStore,
) -> Runner {
    let config = RunnerConfig::new("test-token".to_string()).with_auto_version_strategy(strategy);
    let publisher = Publisher::new(Box::new(store.clone()), "versions.json");
    Runner::with_source(registry, config, Box::new(StaticSource(data)), publisher)
}

#[tokio::test]
async fn agent_entry_publishes_latest_version() {
    let registry = Registry::from_entries([ProjectEntry::agent("go", "apm-agent-go", "v(.*)")]);
    let data: ResponseData =
        [("repo0".to_string(), fragment("apm-agent-go", &["v2.4.0"]))].into();
    let store = MemoryStore::new();

    let report = runner(registry, AutoVersionStrategy::MirrorSdk, data, &store)
        .run()
        .await
        .unwrap();

    assert_eq!(
        store.object("versions.json").unwrap(),
        br#"{"go":{"latest_version":"2.4.0"}}"#
    );
    assert_eq!(report.projects_tracked, 1);
    assert_eq!(report.versions_resolved, 1);
    assert_eq!(report.extraction_misses, 0);
}

#[tokio::test]
async fn telemetry_entry_mirrors_sdk_version_into_both_fields() {
    let registry = Registry::from_entries([ProjectEntry::telemetry_sdk(
        "opentelemetry/go",
        "opentelemetry-go",
        "v(.*)",
    )]);
    let data: ResponseData = [(
        "repo0".to_string(),
        fragment("opentelemetry-go", &["v1.9.0"]),
    )]
    .into();
    let store = MemoryStore::new();

    runner(registry, AutoVersionStrategy::MirrorSdk, data, &store)
        .run()
        .await
        .unwrap();

    let published: serde_json::Value =
        serde_json::from_slice(&store.object("versions.json").unwrap()).unwrap();
    assert_eq!(
        published,
        serde_json::json!({
            "opentelemetry/go": {
                "sdk_latest_version": "1.9.0",
                "auto_latest_version": "1.9.0",
            }
        })
    );
}

#[tokio::test]
async fn non_matching_tag_leaves_field_absent_without_failing() {
    let registry = Registry::from_entries([
        ProjectEntry::agent("go", "apm-agent-go", "v(.*)"),
        ProjectEntry::agent("java", "apm-agent-java", "v(.*)"),
    ]);
    let data: ResponseData = [
        ("repo0".to_string(), fragment("apm-agent-go", &["nightly-build"])),
        ("repo1".to_string(), fragment("apm-agent-java", &["v1.36.0"])),
    ]
    .into();
    let store = MemoryStore::new();

    let report = runner(registry, AutoVersionStrategy::MirrorSdk, data, &store)
        .run()
        .await
        .unwrap();

    let published: serde_json::Value =
        serde_json::from_slice(&store.object("versions.json").unwrap()).unwrap();
    assert_eq!(
        published,
        serde_json::json!({
            "go": {},
            "java": { "latest_version": "1.36.0" },
        })
    );
    assert_eq!(report.versions_resolved, 1);
    assert_eq!(report.extraction_misses, 1);
}

#[tokio::test]
async fn entry_without_releases_does_not_block_others() {
    let registry = Registry::from_entries([
        ProjectEntry::agent("go", "apm-agent-go", "v(.*)"),
        ProjectEntry::telemetry_sdk("opentelemetry/go", "opentelemetry-go", "v(.*)"),
    ]);
    let data: ResponseData = [
        ("repo0".to_string(), fragment("apm-agent-go", &[])),
        (
            "repo1".to_string(),
            fragment("opentelemetry-go", &["v1.9.0"]),
        ),
    ]
    .into();
    let store = MemoryStore::new();

    runner(registry, AutoVersionStrategy::MirrorSdk, data, &store)
        .run()
        .await
        .unwrap();

    let published: serde_json::Value =
        serde_json::from_slice(&store.object("versions.json").unwrap()).unwrap();
    assert_eq!(
        published,
        serde_json::json!({
            "go": {},
            "opentelemetry/go": {
                "sdk_latest_version": "1.9.0",
                "auto_latest_version": "1.9.0",
            }
        })
    );
}

#[tokio::test]
async fn fatal_fetch_error_never_reaches_storage() {
    for make_error in [
        (|| ResolveError::Auth { status: 401 }) as fn() -> ResolveError,
        || ResolveError::MalformedResponse {
            message: "response has no `data` object".to_string(),
        },
    ] {
        let registry = Registry::from_entries([ProjectEntry::agent("go", "apm-agent-go", "v(.*)")]);
        let store = MemoryStore::new();
        let config = RunnerConfig::new("test-token".to_string());
        let publisher = Publisher::new(Box::new(store.clone()), "versions.json");
        let runner = Runner::with_source(
            registry,
            config,
            Box::new(FailingSource(make_error)),
            publisher,
        );

        let result = runner.run().await;

        assert!(result.is_err());
        assert!(store.operations().is_empty(), "no publish on the fatal path");
    }
}

#[tokio::test]
async fn auto_repo_strategy_resolves_instrumentation_independently() {
    let registry = Registry::from_entries([ProjectEntry::telemetry_sdk_with_auto(
        "opentelemetry/java",
        "opentelemetry-java",
        "v(.*)",
        "opentelemetry-java-instrumentation",
        "v(.*)",
    )]);
    let data: ResponseData = [
        (
            "repo0".to_string(),
            fragment("opentelemetry-java", &["v1.40.0"]),
        ),
        (
            "repo1".to_string(),
            fragment("opentelemetry-java-instrumentation", &["v2.5.0"]),
        ),
    ]
    .into();
    let store = MemoryStore::new();

    runner(registry, AutoVersionStrategy::QueryAutoRepo, data, &store)
        .run()
        .await
        .unwrap();

    let published: serde_json::Value =
        serde_json::from_slice(&store.object("versions.json").unwrap()).unwrap();
    assert_eq!(
        published,
        serde_json::json!({
            "opentelemetry/java": {
                "sdk_latest_version": "1.40.0",
                "auto_latest_version": "2.5.0",
            }
        })
    );
}

#[tokio::test]
async fn identical_input_publishes_identical_bytes() {
    let registry = Registry::builtin();
    let plan = QueryPlan::build(&registry, AutoVersionStrategy::MirrorSdk);
    let data: ResponseData = plan
        .requests
        .iter()
        .map(|request| (request.alias.clone(), fragment(&request.repo, &["v1.0.0"])))
        .collect();

    let mut published = Vec::new();
    for _ in 0..2 {
        let store = MemoryStore::new();
        runner(
            Registry::builtin(),
            AutoVersionStrategy::MirrorSdk,
            data.clone(),
            &store,
        )
        .run()
        .await
        .unwrap();
        published.push(store.object("versions.json").unwrap());
    }
    assert_eq!(published[0], published[1]);
}
