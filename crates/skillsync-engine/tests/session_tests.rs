#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use skillsync_core::{ErrorKind, ManifestEntry, SyncError, SyncStatus};
    use skillsync_engine::{SessionOptions, SyncEngine, SyncSession};
    use skillsync_github::{MockFailure, MockRemote};
    use skillsync_manifest::{Manifest, ManifestStore};
    use tokio_util::sync::CancellationToken;

    fn session(mock: &MockRemote, skills_dir: &Path, options: SessionOptions) -> SyncSession {
        let engine = SyncEngine::new(Arc::new(mock.clone()), skills_dir);
        SyncSession::new(Arc::new(engine), options)
    }

    fn three_entries() -> Manifest {
        Manifest::from_entries([
            ManifestEntry::new("alpha", "org/alpha", "skills/alpha").with_sha("a1"),
            ManifestEntry::new("beta", "org/beta", "skills/beta").with_sha("b1"),
            ManifestEntry::new("gamma", "org/gamma", "skills/gamma").with_sha("c1"),
        ])
        .unwrap()
    }

    fn three_remotes() -> MockRemote {
        MockRemote::new()
            .with_head("org/alpha", None, "a2")
            .with_file("org/alpha", "skills/alpha", "SKILL.md", "alpha v2")
            .with_head("org/beta", None, "b2")
            .with_file("org/beta", "skills/beta", "SKILL.md", "beta v2")
            .with_head("org/gamma", None, "c2")
            .with_file("org/gamma", "skills/gamma", "SKILL.md", "gamma v2")
    }

    // ── Example scenario ───────────────────────────────────────

    #[tokio::test]
    async fn test_example_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("upstream.json");
        std::fs::write(
            &manifest_path,
            r#"{"bun": {"sourceRepo": "org/bun-skills", "sourcePath": "skills/bun", "sourceRef": "main", "lastSyncedSha": "abc123"}}"#,
        )
        .unwrap();
        let skills = dir.path().join("skills");
        std::fs::create_dir_all(skills.join("bun")).unwrap();
        std::fs::write(skills.join("bun/stale.md"), "removed upstream").unwrap();

        let mock = MockRemote::new()
            .with_head("org/bun-skills", Some("main"), "def456")
            .with_file("org/bun-skills", "skills/bun", "SKILL.md", "# Bun")
            .with_file("org/bun-skills", "skills/bun", "reference/cli.md", "bun run");
        let store = ManifestStore::new(&manifest_path);

        let report = session(&mock, &skills, SessionOptions::default())
            .run_with_store(&store, &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success());
        assert!(report.persisted);
        assert_eq!(report.summary().updated, 1);

        let mut on_disk: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(skills.join("bun")).unwrap() {
            on_disk.push(entry.unwrap().file_name().to_string_lossy().into_owned());
        }
        on_disk.sort();
        assert_eq!(on_disk, vec!["SKILL.md", "reference"]);
        assert_eq!(
            std::fs::read_to_string(skills.join("bun/reference/cli.md")).unwrap(),
            "bun run"
        );

        let saved = store.load().unwrap();
        let bun = saved.get("bun").unwrap();
        assert_eq!(bun.last_synced_sha.as_deref(), Some("def456"));
        assert!(bun.last_synced_at.is_some());
        assert_eq!(bun.source_ref.as_deref(), Some("main"));
    }

    // ── Idempotence and change detection ───────────────────────

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("upstream.json"));
        store.save(&three_entries()).unwrap();
        let mock = three_remotes();
        let session = session(&mock, &dir.path().join("skills"), SessionOptions::default());
        let cancel = CancellationToken::new();

        let first = session.run_with_store(&store, &[], &cancel).await.unwrap();
        assert_eq!(first.summary().updated, 3);
        let trees_after_first = mock.tree_calls();
        let manifest_after_first = std::fs::read_to_string(store.path()).unwrap();

        let second = session.run_with_store(&store, &[], &cancel).await.unwrap();
        let summary = second.summary();
        assert_eq!(summary.unchanged, 3);
        assert_eq!(summary.updated, 0);
        assert!(!second.persisted);
        assert_eq!(mock.tree_calls(), trees_after_first);
        assert_eq!(mock.resolve_calls(), 6);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), manifest_after_first);
    }

    #[tokio::test]
    async fn test_unchanged_run_leaves_manifest_bytes_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.json");
        // compact, hand-written formatting that a save would rewrite
        let raw = r#"{"alpha":{"sourceRepo":"org/alpha","sourcePath":"skills/alpha","lastSyncedSha":"a1"}}"#;
        std::fs::write(&path, raw).unwrap();
        let mock = MockRemote::new().with_head("org/alpha", None, "a1");

        let report = session(&mock, &dir.path().join("skills"), SessionOptions::default())
            .run_with_store(&ManifestStore::new(&path), &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success());
        assert!(!report.persisted);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), raw);
    }

    #[tokio::test]
    async fn test_change_detection_fetches_new_sha() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = three_entries();
        let mock = three_remotes();

        let report = session(&mock, dir.path(), SessionOptions::default())
            .run(&manifest, &["beta".to_string()], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].status, SyncStatus::Updated);
        let beta = report.updated_manifest.get("beta").unwrap();
        assert_eq!(beta.last_synced_sha.as_deref(), Some("b2"));
        // entries outside the filter are passed through untouched
        assert_eq!(
            report.updated_manifest.get("alpha").unwrap().last_synced_sha.as_deref(),
            Some("a1")
        );
        assert!(mock.calls().iter().any(|c| matches!(
            c,
            skillsync_github::MockCall::FetchTree { repo, sha, .. } if repo == "org/beta" && sha == "b2"
        )));
        // the input manifest itself is not mutated
        assert_eq!(manifest.get("beta").unwrap().last_synced_sha.as_deref(), Some("b1"));
    }

    // ── Failure isolation ──────────────────────────────────────

    #[tokio::test]
    async fn test_one_missing_upstream_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("upstream.json"));
        store.save(&three_entries()).unwrap();
        let skills = dir.path().join("skills");
        std::fs::create_dir_all(skills.join("beta")).unwrap();
        std::fs::write(skills.join("beta/SKILL.md"), "beta v1").unwrap();
        let mock = three_remotes().fail_tree("org/beta", MockFailure::NotFound);

        let report = session(&mock, &skills, SessionOptions::default())
            .run_with_store(&store, &[], &CancellationToken::new())
            .await
            .unwrap();

        let summary = report.summary();
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.failed, 1);
        assert!(!report.is_success());
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.skill_name, "beta");
        assert_eq!(failure.error.as_ref().unwrap().kind, ErrorKind::NotFound);

        // beta keeps its old content and old SHA
        assert_eq!(std::fs::read_to_string(skills.join("beta/SKILL.md")).unwrap(), "beta v1");
        let saved = store.load().unwrap();
        assert_eq!(saved.get("alpha").unwrap().last_synced_sha.as_deref(), Some("a2"));
        assert_eq!(saved.get("beta").unwrap().last_synced_sha.as_deref(), Some("b1"));
        assert!(saved.get("beta").unwrap().last_synced_at.is_none());
        assert_eq!(saved.get("gamma").unwrap().last_synced_sha.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn test_missing_manifest_aborts_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let mock = three_remotes();

        let err = session(&mock, dir.path(), SessionOptions::default())
            .run_with_store(
                &ManifestStore::new(dir.path().join("upstream.json")),
                &[],
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Manifest(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_filter_aborts_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let mock = three_remotes();

        let err = session(&mock, dir.path(), SessionOptions::default())
            .run(&three_entries(), &["delta".to_string()], &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(mock.calls().is_empty());
    }

    // ── Rate limits ────────────────────────────────────────────

    #[tokio::test]
    async fn test_short_rate_limit_is_waited_out() {
        let dir = tempfile::tempdir().unwrap();
        let mock = three_remotes().fail_resolve_once("org/alpha", MockFailure::RateLimited(0));

        let report = session(&mock, dir.path(), SessionOptions::default())
            .run(&three_entries(), &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.summary().updated, 3);
        // one result per entry even though alpha was tried twice
        assert_eq!(report.results.len(), 3);
        assert_eq!(mock.resolve_calls(), 4);
    }

    #[tokio::test]
    async fn test_long_rate_limit_is_deferred() {
        let dir = tempfile::tempdir().unwrap();
        let mock = three_remotes().fail_resolve_once("org/alpha", MockFailure::RateLimited(3600));
        let options = SessionOptions {
            max_rate_limit_wait: Duration::from_secs(60),
            ..Default::default()
        };

        let report = session(&mock, dir.path(), options)
            .run(&three_entries(), &[], &CancellationToken::new())
            .await
            .unwrap();

        let summary = report.summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.updated, 2);
        let alpha = report.failures().next().unwrap();
        assert_eq!(alpha.skill_name, "alpha");
        assert_eq!(alpha.retry_after(), Some(Duration::from_secs(3600)));
        assert_eq!(mock.resolve_calls(), 3);
        assert_eq!(
            report.updated_manifest.get("alpha").unwrap().last_synced_sha.as_deref(),
            Some("a1")
        );
    }

    // ── Concurrency ────────────────────────────────────────────

    #[tokio::test]
    async fn test_default_is_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let mock = three_remotes().with_latency(Duration::from_millis(20));

        session(&mock, dir.path(), SessionOptions::default())
            .run(&three_entries(), &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(mock.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_bounded_concurrency_overlaps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mock = three_remotes().with_latency(Duration::from_millis(50));
        let options = SessionOptions {
            concurrency: 2,
            ..Default::default()
        };

        let report = session(&mock, dir.path(), options)
            .run(&three_entries(), &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.summary().updated, 3);
        assert_eq!(mock.max_in_flight(), 2);
        let names: Vec<&str> = report.results.iter().map(|r| r.skill_name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        for name in ["alpha", "beta", "gamma"] {
            assert!(dir.path().join(name).join("SKILL.md").exists());
        }
    }

    // ── Interruption ───────────────────────────────────────────

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mock = three_remotes();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = session(&mock, dir.path(), SessionOptions::default())
            .run(&three_entries(), &[], &cancel)
            .await
            .unwrap();

        assert!(report.interrupted);
        assert!(report.results.is_empty());
        assert_eq!(report.skipped, vec!["alpha", "beta", "gamma"]);
        assert!(!report.is_success());
        assert!(mock.calls().is_empty());
        assert_eq!(report.updated_manifest, three_entries());
    }

    #[tokio::test]
    async fn test_interrupt_lets_in_flight_entry_finish() {
        let dir = tempfile::tempdir().unwrap();
        // unchanged entries make a single 100ms resolve call each
        let manifest = Manifest::from_entries([
            ManifestEntry::new("alpha", "org/alpha", "skills/alpha").with_sha("a2"),
            ManifestEntry::new("beta", "org/beta", "skills/beta").with_sha("b2"),
            ManifestEntry::new("gamma", "org/gamma", "skills/gamma").with_sha("c2"),
        ])
        .unwrap();
        let mock = three_remotes().with_latency(Duration::from_millis(100));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let report = session(&mock, dir.path(), SessionOptions::default())
            .run(&manifest, &[], &cancel)
            .await
            .unwrap();

        assert!(report.interrupted);
        let visited: Vec<&str> = report.results.iter().map(|r| r.skill_name.as_str()).collect();
        assert_eq!(visited, vec!["alpha", "beta"]);
        assert!(report.results.iter().all(|r| r.status == SyncStatus::Unchanged));
        assert_eq!(report.skipped, vec!["gamma"]);
    }

    // ── Check ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_check_reports_outdated_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockRemote::new()
            .with_head("org/alpha", None, "a1")
            .with_head("org/beta", None, "b2")
            .fail_resolve("org/gamma", MockFailure::NotFound);

        let checks = session(&mock, dir.path(), SessionOptions::default())
            .check(&three_entries(), &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(checks.len(), 3);
        assert!(!checks[0].outdated);
        assert!(checks[1].outdated);
        assert_eq!(checks[1].remote_sha.as_deref(), Some("b2"));
        assert_eq!(checks[2].error.as_ref().unwrap().kind, ErrorKind::NotFound);
        assert_eq!(mock.tree_calls(), 0);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
