#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use skillsync_core::{ManifestEntry, SyncError, SyncResult};
    use skillsync_manifest::{Manifest, ManifestStore};

    const EXAMPLE: &str = r#"{
  "bun": {
    "sourceRepo": "org/bun-skills",
    "sourcePath": "skills/bun",
    "sourceRef": "main",
    "lastSyncedSha": "abc123"
  }
}
"#;

    fn temp_files(dir: &std::path::Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    // ── Load tests ─────────────────────────────────────────────

    #[test]
    fn test_load_example_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.json");
        std::fs::write(&path, EXAMPLE).unwrap();

        let manifest = ManifestStore::new(&path).load().unwrap();
        let bun = manifest.get("bun").unwrap();
        assert_eq!(bun.source_repo, "org/bun-skills");
        assert_eq!(bun.source_path, "skills/bun");
        assert_eq!(bun.source_ref.as_deref(), Some("main"));
        assert_eq!(bun.last_synced_sha.as_deref(), Some("abc123"));
        assert!(bun.last_synced_at.is_none());
    }

    #[test]
    fn test_load_missing_file_is_manifest_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ManifestStore::new(dir.path().join("upstream.json"))
            .load()
            .unwrap_err();
        assert!(matches!(err, SyncError::Manifest(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestStore::new(dir.path().join("upstream.json"))
            .load_or_default()
            .unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_load_invalid_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.json");
        std::fs::write(&path, "{\"bun\": ").unwrap();
        let err = ManifestStore::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("upstream.json"));
    }

    // ── Save tests ─────────────────────────────────────────────

    #[test]
    fn test_save_then_load_preserves_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.json");
        std::fs::write(&path, EXAMPLE).unwrap();
        let store = ManifestStore::new(&path);

        let mut manifest = store.load().unwrap();
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert!(manifest.apply(&SyncResult::updated("bun", "def456", at, 4)));
        store.save(&manifest).unwrap();

        let reloaded = store.load().unwrap();
        let bun = reloaded.get("bun").unwrap();
        assert_eq!(bun.last_synced_sha.as_deref(), Some("def456"));
        assert_eq!(bun.last_synced_at, Some(at));
        assert!(temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_save_writes_keyed_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.json");
        let manifest = Manifest::from_entries([
            ManifestEntry::new("prisma", "org/prisma-skills", "prisma").with_ref("v5"),
        ])
        .unwrap();
        ManifestStore::new(&path).save(&manifest).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["prisma"]["sourceRef"], "v5");
        assert!(value["prisma"]["lastSyncedSha"].is_null());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta").join("upstream.json");
        ManifestStore::new(&path).save(&Manifest::new()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
    }

    #[test]
    fn test_crash_before_rename_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.json");
        std::fs::write(&path, EXAMPLE).unwrap();
        let store = ManifestStore::new(&path);

        let mut manifest = store.load().unwrap();
        manifest.apply(&SyncResult::updated("bun", "def456", Utc::now(), 1));

        let staged = store.stage(&manifest).unwrap();
        assert!(staged.temp_path().exists());
        // the new content is on disk, but only in the temp file
        assert_eq!(std::fs::read_to_string(&path).unwrap(), EXAMPLE);
        drop(staged);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), EXAMPLE);
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.get("bun").unwrap().last_synced_sha.as_deref(), Some("abc123"));
        assert!(temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_staged_commit_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.json");
        std::fs::write(&path, EXAMPLE).unwrap();
        let store = ManifestStore::new(&path);

        let mut manifest = store.load().unwrap();
        manifest.apply(&SyncResult::updated("bun", "def456", Utc::now(), 1));
        store.stage(&manifest).unwrap().commit().unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.get("bun").unwrap().last_synced_sha.as_deref(), Some("def456"));
    }

    // ── Permission tests ───────────────────────────────────────

    #[cfg(unix)]
    fn mode(path: &std::path::Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[cfg(unix)]
    #[test]
    fn test_save_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.json");
        std::fs::write(&path, EXAMPLE).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        let store = ManifestStore::new(&path);

        let mut manifest = store.load().unwrap();
        manifest.apply(&SyncResult::updated("bun", "def456", Utc::now(), 1));
        store.save(&manifest).unwrap();
        assert_eq!(mode(&path), 0o644);

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();
        store.save(&manifest).unwrap();
        assert_eq!(mode(&path), 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn test_new_manifest_is_world_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upstream.json");
        let manifest =
            Manifest::from_entries([ManifestEntry::new("bun", "org/bun-skills", "skills/bun")])
                .unwrap();

        ManifestStore::new(&path).save(&manifest).unwrap();
        assert_eq!(mode(&path), 0o644);
    }
}
