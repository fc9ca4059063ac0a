//! End-to-end publish scenarios against the in-memory seams.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use manifest_publisher_core::fakes::{
    zip_tree, MemoryGitStore, RecordingRegistry, ScriptedRenderer, StaticArchiveSource,
};
use manifest_publisher_core::{
    render_tree, ConfigurationGap, Environment, GitError, NotificationError, NotificationStatus,
    PublishError, PublishOutcome, PublishPipeline, PublisherConfig, ReleaseEvent, RenderedTree,
};

const REF: &str = "heads/main";

const DESCRIPTOR: &str = "\
component-of:
  - name: svc
version: 1.2.3
deploy:
  namespace-prefix: team
";

const PATHS: [&str; 4] = [
    "svc/deploy-stg.yaml",
    "svc/deploy-sit.yaml",
    "svc/deploy-hlg.yaml",
    "svc/deploy-prd.yaml",
];

fn event() -> ReleaseEvent {
    ReleaseEvent::new(
        "acme",
        "svc",
        "v1.2.3",
        "https://api.github.com/repos/acme/svc/zipball/v1.2.3",
    )
    .unwrap()
}

fn write_tree(root: &Path, descriptor: Option<&str>, overlays: &[&str]) {
    std::fs::create_dir_all(root.join("chart")).unwrap();
    std::fs::write(root.join("chart/Chart.yaml"), "name: svc\n").unwrap();
    if let Some(descriptor) = descriptor {
        std::fs::write(root.join(".viaops.yml"), descriptor).unwrap();
    }
    for overlay in overlays {
        let path = root.join("chart").join(overlay);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "replicas: 1\n").unwrap();
    }
}

struct Harness {
    store: Arc<MemoryGitStore>,
    renderer: Arc<ScriptedRenderer>,
    registry: Arc<RecordingRegistry>,
    pipeline: PublishPipeline,
    work: tempfile::TempDir,
}

fn harness(
    store: MemoryGitStore,
    renderer: ScriptedRenderer,
    registry: RecordingRegistry,
) -> Harness {
    let work = tempfile::tempdir().unwrap();
    let config = PublisherConfig {
        work_dir: work.path().join("staging"),
        ..PublisherConfig::default()
    };
    let store = Arc::new(store);
    let renderer = Arc::new(renderer);
    let registry = Arc::new(registry);
    let pipeline = PublishPipeline::new(
        config,
        Arc::new(StaticArchiveSource::unavailable()),
        renderer.clone(),
        store.clone(),
    )
    .unwrap()
    .with_registry(registry.clone());

    Harness {
        store,
        renderer,
        registry,
        pipeline,
        work,
    }
}

fn default_harness() -> Harness {
    harness(
        MemoryGitStore::new(),
        ScriptedRenderer::new(),
        RecordingRegistry::new(),
    )
}

// ── Happy path ──────────────────────────────────────────────────────────

#[tokio::test]
async fn release_commits_one_manifest_per_environment() {
    let h = harness(
        MemoryGitStore::new().with_file("README.md", "deploy repo\n"),
        ScriptedRenderer::new(),
        RecordingRegistry::new(),
    );
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), Some(DESCRIPTOR), &[]);
    let before = h.store.head(REF).unwrap();

    let report = h.pipeline.publish_tree(&event(), src.path()).await.unwrap();

    assert!(report.committed());
    let head = h.store.head(REF).unwrap();
    assert_eq!(report.commit_sha(), Some(&head));

    let commit = h.store.commit(&head).unwrap();
    assert_eq!(commit.message, "v1.2.3");
    assert_eq!(commit.parents, vec![before]);

    let files = h.store.files_at(REF).unwrap();
    assert_eq!(files.len(), 5);
    assert!(files.contains_key("README.md"));
    for (path, env) in PATHS.iter().zip(Environment::ALL) {
        let content = h.store.blob_content(&files[*path]).unwrap();
        assert_eq!(content, format!("# svc team-{env}").into_bytes());
    }

    let paths: Vec<&str> = report.artifacts.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(paths, PATHS.to_vec());
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(h.renderer.dependency_calls(), vec![src.path().join("chart")]);
}

#[tokio::test]
async fn release_sends_one_registration() {
    let h = default_harness();
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), Some(DESCRIPTOR), &[]);

    let report = h.pipeline.publish_tree(&event(), src.path()).await.unwrap();

    assert_eq!(report.notification, NotificationStatus::Sent);
    let registrations = h.registry.registrations();
    assert_eq!(registrations.len(), 1);
    let json = serde_json::to_value(&registrations[0]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "name": "svc",
            "url": "https://github.com/acme/spinnaker/blob/main/svc/deploy-sit.yaml",
            "version": "1.2.3",
            "products": [{ "productName": "svc" }],
            "type": "Helm",
        })
    );
}

#[tokio::test]
async fn grouped_release_concatenates_groups_in_order() {
    let h = default_harness();
    let src = tempfile::tempdir().unwrap();
    let overlays: Vec<String> = ["a", "b"]
        .iter()
        .flat_map(|g| Environment::ALL.map(|env| format!("{g}/values-{env}.yaml")))
        .collect();
    let overlays: Vec<&str> = overlays.iter().map(String::as_str).collect();
    write_tree(
        src.path(),
        Some("deploy:\n  namespace-prefix: team\n  flag: [a, b]\n"),
        &overlays,
    );

    h.pipeline.publish_tree(&event(), src.path()).await.unwrap();

    let files = h.store.files_at(REF).unwrap();
    let stg = h.store.blob_content(&files["svc/deploy-stg.yaml"]).unwrap();
    assert_eq!(stg, b"# svc-a team-stg\n# svc-b team-stg".to_vec());
    assert_eq!(h.renderer.template_calls().len(), 8);
}

#[tokio::test]
async fn publish_from_archive_removes_staging() {
    let work = tempfile::tempdir().unwrap();
    let staging_root = work.path().join("staging");
    let bytes = zip_tree(&[
        ("acme-svc-0a1b2c3/.viaops.yml", DESCRIPTOR),
        ("acme-svc-0a1b2c3/chart/Chart.yaml", "name: svc\n"),
    ]);
    let archives = Arc::new(StaticArchiveSource::new(bytes));
    let store = Arc::new(MemoryGitStore::new());
    let config = PublisherConfig {
        work_dir: staging_root.clone(),
        ..PublisherConfig::default()
    };
    let pipeline = PublishPipeline::new(
        config,
        archives.clone(),
        Arc::new(ScriptedRenderer::new()),
        store.clone(),
    )
    .unwrap();

    let report = pipeline.publish(&event()).await.unwrap();

    assert!(report.committed());
    assert_eq!(report.notification, NotificationStatus::Disabled);
    assert_eq!(archives.fetches(), vec![event().archive_url().to_string()]);
    assert_eq!(std::fs::read_dir(&staging_root).unwrap().count(), 0);
}

#[tokio::test]
async fn failed_download_still_removes_staging() {
    let h = default_harness();

    let err = h.pipeline.publish(&event()).await.unwrap_err();

    assert!(matches!(err, PublishError::Archive(_)));
    let staging = h.work.path().join("staging");
    assert_eq!(std::fs::read_dir(staging).unwrap().count(), 0);
    assert_eq!(h.store.calls().total(), 0);
}

// ── Configuration gaps ──────────────────────────────────────────────────

#[tokio::test]
async fn missing_namespace_prefix_touches_nothing() {
    let h = default_harness();
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), Some("version: 1\n"), &[]);

    let report = h.pipeline.publish_tree(&event(), src.path()).await.unwrap();

    assert!(!report.committed());
    assert_eq!(
        report.outcome,
        PublishOutcome::Skipped {
            gap: ConfigurationGap::MissingNamespacePrefix
        }
    );
    assert_eq!(h.store.calls().total(), 0);
    assert!(h.renderer.template_calls().is_empty());
    assert!(h.renderer.dependency_calls().is_empty());
    assert!(h.registry.registrations().is_empty());
}

#[tokio::test]
async fn missing_descriptor_touches_nothing() {
    let h = default_harness();
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), None, &[]);

    let report = h.pipeline.publish_tree(&event(), src.path()).await.unwrap();

    assert!(matches!(
        report.outcome,
        PublishOutcome::Skipped {
            gap: ConfigurationGap::MissingDescriptor { .. }
        }
    ));
    assert_eq!(h.store.calls().total(), 0);
}

// ── All-or-nothing rendering ────────────────────────────────────────────

#[tokio::test]
async fn render_failure_creates_no_git_objects() {
    let h = harness(
        MemoryGitStore::new(),
        ScriptedRenderer::new().failing(Environment::Prd),
        RecordingRegistry::new(),
    );
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), Some(DESCRIPTOR), &[]);
    let before = h.store.head(REF).unwrap();

    let err = h.pipeline.publish_tree(&event(), src.path()).await.unwrap_err();

    assert!(matches!(err, PublishError::Render { ref environment, .. } if environment == "prd"));
    assert_eq!(h.store.calls().total(), 0);
    assert_eq!(h.store.head(REF).unwrap(), before);
}

#[tokio::test]
async fn missing_group_overlay_fails_before_rendering() {
    let h = default_harness();
    let src = tempfile::tempdir().unwrap();
    let overlays: Vec<String> = Environment::ALL
        .iter()
        .map(|env| format!("a/values-{env}.yaml"))
        .collect();
    let overlays: Vec<&str> = overlays.iter().map(String::as_str).collect();
    write_tree(
        src.path(),
        Some("deploy:\n  namespace-prefix: team\n  flag: [a, b]\n"),
        &overlays,
    );

    let err = h.pipeline.publish_tree(&event(), src.path()).await.unwrap_err();

    assert!(matches!(err, PublishError::MissingValues { ref group, .. } if group == "b"));
    assert!(h.renderer.template_calls().is_empty());
    assert_eq!(h.store.calls().total(), 0);
}

#[tokio::test]
async fn dependency_update_failure_stops_the_run() {
    let h = harness(
        MemoryGitStore::new(),
        ScriptedRenderer::new().failing_dependency_update(),
        RecordingRegistry::new(),
    );
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), Some(DESCRIPTOR), &[]);

    let err = h.pipeline.publish_tree(&event(), src.path()).await.unwrap_err();

    assert!(matches!(err, PublishError::DependencyUpdate(_)));
    assert!(h.renderer.template_calls().is_empty());
    assert_eq!(h.store.calls().total(), 0);
}

// ── Ref update retry ────────────────────────────────────────────────────

#[tokio::test]
async fn ref_conflicts_are_retried_from_a_fresh_head() {
    let h = harness(
        MemoryGitStore::new()
            .with_ref_update_statuses(vec![409, 409, 200])
            .with_concurrent_pushes(),
        ScriptedRenderer::new(),
        RecordingRegistry::new(),
    );
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), Some(DESCRIPTOR), &[]);

    let report = h.pipeline.publish_tree(&event(), src.path()).await.unwrap();

    let statuses: Vec<Option<u16>> = report.attempts.iter().map(|a| a.status).collect();
    assert_eq!(statuses, vec![Some(409), Some(409), Some(200)]);
    let bases: HashSet<_> = report.attempts.iter().map(|a| &a.base_ref_sha).collect();
    assert_eq!(bases.len(), 3);

    let calls = h.store.calls();
    assert_eq!(calls.get_ref, 3);
    assert_eq!(calls.create_tree, 3);
    assert_eq!(calls.create_commit, 3);
    assert_eq!(calls.update_ref, 3);
    assert_eq!(calls.create_blob, 4);

    // Concurrent writers' files survive next to ours.
    let files = h.store.files_at(REF).unwrap();
    assert!(files.contains_key("other/deploy-1.yaml"));
    assert!(files.contains_key("other/deploy-2.yaml"));
    for path in PATHS {
        assert!(files.contains_key(path));
    }
}

#[tokio::test]
async fn ref_conflict_gives_up_after_three_attempts() {
    let h = harness(
        MemoryGitStore::new().with_ref_update_statuses(vec![409, 409, 409, 200]),
        ScriptedRenderer::new(),
        RecordingRegistry::new(),
    );
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), Some(DESCRIPTOR), &[]);
    let before = h.store.head(REF).unwrap();

    let err = h.pipeline.publish_tree(&event(), src.path()).await.unwrap_err();

    match err {
        PublishError::RefConflict {
            attempts,
            last_status,
            history,
            notification,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(last_status, Some(409));
            let statuses: Vec<Option<u16>> = history.iter().map(|a| a.status).collect();
            assert_eq!(statuses, vec![Some(409), Some(409), Some(409)]);
            assert_eq!(notification, Some(NotificationStatus::Sent));
        }
        other => panic!("expected RefConflict, got {other:?}"),
    }
    assert_eq!(h.store.calls().update_ref, 3);
    assert_eq!(h.store.head(REF).unwrap(), before);
    // Registration does not depend on the commit outcome.
    assert_eq!(h.registry.registrations().len(), 1);
}

#[tokio::test]
async fn ref_update_without_response_counts_as_attempt() {
    let h = harness(
        MemoryGitStore::new().with_ref_update_failure(GitError::TimedOut {
            operation: "update_ref".to_string(),
        }),
        ScriptedRenderer::new(),
        RecordingRegistry::new(),
    );
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), Some(DESCRIPTOR), &[]);

    let report = h.pipeline.publish_tree(&event(), src.path()).await.unwrap();

    let statuses: Vec<Option<u16>> = report.attempts.iter().map(|a| a.status).collect();
    assert_eq!(statuses, vec![None, Some(200)]);
}

#[tokio::test]
async fn git_timeout_surfaces_as_timeout() {
    let h = harness(
        MemoryGitStore::new().fail_blobs_with(GitError::TimedOut {
            operation: "create_blob".to_string(),
        }),
        ScriptedRenderer::new(),
        RecordingRegistry::new(),
    );
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), Some(DESCRIPTOR), &[]);
    let before = h.store.head(REF).unwrap();

    let err = h.pipeline.publish_tree(&event(), src.path()).await.unwrap_err();

    assert!(err.is_timeout(), "expected a timeout, got {err:?}");
    assert!(matches!(err, PublishError::BlobCreate { .. }));
    assert_eq!(h.store.calls().update_ref, 0);
    assert_eq!(h.store.head(REF).unwrap(), before);
}

// ── Registration is decoupled ───────────────────────────────────────────

#[tokio::test]
async fn registration_failure_does_not_fail_the_commit() {
    let h = harness(
        MemoryGitStore::new(),
        ScriptedRenderer::new(),
        RecordingRegistry::failing(NotificationError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }),
    );
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), Some(DESCRIPTOR), &[]);

    let report = h.pipeline.publish_tree(&event(), src.path()).await.unwrap();

    assert!(report.committed());
    assert!(matches!(report.notification, NotificationStatus::Failed { .. }));
}

#[tokio::test]
async fn registration_without_version_is_skipped() {
    let h = default_harness();
    let src = tempfile::tempdir().unwrap();
    write_tree(
        src.path(),
        Some("component-of:\n  - name: svc\ndeploy:\n  namespace-prefix: team\n"),
        &[],
    );

    let report = h.pipeline.publish_tree(&event(), src.path()).await.unwrap();

    assert!(report.committed());
    assert!(matches!(report.notification, NotificationStatus::Skipped { .. }));
    assert!(h.registry.registrations().is_empty());
}

#[tokio::test]
async fn malformed_registry_fields_still_publish() {
    let h = default_harness();
    let src = tempfile::tempdir().unwrap();
    write_tree(
        src.path(),
        Some("component-of:\n  - id: 1\nversion: true\ndeploy:\n  namespace-prefix: team\n"),
        &[],
    );

    let report = h.pipeline.publish_tree(&event(), src.path()).await.unwrap();

    assert!(report.committed());
    assert!(matches!(report.notification, NotificationStatus::Skipped { .. }));
    assert!(h.registry.registrations().is_empty());
}

// ── Dry run ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn render_tree_renders_without_git() {
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), Some(DESCRIPTOR), &[]);
    let renderer = ScriptedRenderer::new();

    let rendered = render_tree(&renderer, &PublisherConfig::default(), "svc", src.path())
        .await
        .unwrap();

    match rendered {
        RenderedTree::Rendered { artifacts, .. } => {
            let paths: Vec<&str> = artifacts.iter().map(|a| a.path()).collect();
            assert_eq!(paths, PATHS.to_vec());
        }
        RenderedTree::Skipped(gap) => panic!("unexpected gap: {gap}"),
    }
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = PublisherConfig {
        max_attempts: 0,
        ..PublisherConfig::default()
    };
    let result = PublishPipeline::new(
        config,
        Arc::new(StaticArchiveSource::unavailable()),
        Arc::new(ScriptedRenderer::new()),
        Arc::new(MemoryGitStore::new()),
    );
    assert!(matches!(result, Err(PublishError::InvalidConfig(_))));
}
