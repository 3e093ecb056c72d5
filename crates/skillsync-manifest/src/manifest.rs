use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use skillsync_core::{ManifestEntry, SyncError, SyncResult, SyncStatus};

/// Every upstream-tracked skill, keyed by skill name.
///
/// Serializes as a JSON object keyed by skill name. Deserializes from that
/// form or from an array of records carrying `skillName`; duplicate names are
/// rejected in both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ManifestEntry>) -> skillsync_core::Result<Self> {
        let mut manifest = Self::new();
        for entry in entries {
            manifest.insert(entry)?;
        }
        Ok(manifest)
    }

    /// Register a new entry. Fails if the skill name is already tracked.
    pub fn insert(&mut self, entry: ManifestEntry) -> skillsync_core::Result<()> {
        if self.entries.contains_key(&entry.skill_name) {
            return Err(SyncError::ManifestValidation {
                field: entry.skill_name.clone(),
                reason: "skill is already tracked".into(),
            });
        }
        self.entries.insert(entry.skill_name.clone(), entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ManifestEntry> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries sorted by skill name.
    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut ManifestEntry> {
        self.entries.values_mut()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge an updated result's SHA and timestamp into its entry.
    /// Unchanged and failed results leave the entry as it was.
    /// Returns whether the entry changed.
    pub fn apply(&mut self, result: &SyncResult) -> bool {
        if result.status != SyncStatus::Updated {
            return false;
        }
        let (Some(sha), Some(at)) = (result.sha.as_deref(), result.synced_at) else {
            return false;
        };
        match self.entries.get_mut(&result.skill_name) {
            Some(entry) => {
                entry.mark_synced(sha, at);
                true
            }
            None => false,
        }
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, entry) in &self.entries {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ManifestVisitor)
    }
}

struct ManifestVisitor;

impl<'de> Visitor<'de> for ManifestVisitor {
    type Value = Manifest;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("an object keyed by skill name or an array of entries")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Manifest, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some(name) = map.next_key::<String>()? {
            let mut entry: ManifestEntry = map.next_value()?;
            if !entry.skill_name.is_empty() && entry.skill_name != name {
                return Err(de::Error::custom(format!(
                    "entry '{}' declares a different skillName '{}'",
                    name, entry.skill_name
                )));
            }
            entry.skill_name = name.clone();
            if entries.insert(name.clone(), entry).is_some() {
                return Err(de::Error::custom(format!("duplicate skill '{name}'")));
            }
        }
        Ok(Manifest { entries })
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Manifest, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some(entry) = seq.next_element::<ManifestEntry>()? {
            if entry.skill_name.is_empty() {
                return Err(de::Error::custom(format!(
                    "entry for {}:{} is missing skillName",
                    entry.source_repo, entry.source_path
                )));
            }
            let name = entry.skill_name.clone();
            if entries.insert(name.clone(), entry).is_some() {
                return Err(de::Error::custom(format!("duplicate skill '{name}'")));
            }
        }
        Ok(Manifest { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn keyed_form_fills_skill_names() {
        let json = r#"{
            "bun": {"sourceRepo": "org/bun-skills", "sourcePath": "skills/bun", "sourceRef": "main", "lastSyncedSha": "abc123"},
            "prisma": {"sourceRepo": "org/prisma-skills", "sourcePath": "prisma"}
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.len(), 2);
        let bun = manifest.get("bun").unwrap();
        assert_eq!(bun.skill_name, "bun");
        assert_eq!(bun.last_synced_sha.as_deref(), Some("abc123"));
        assert!(manifest.get("prisma").unwrap().source_ref.is_none());
    }

    #[test]
    fn array_form_is_accepted() {
        let json = r#"[
            {"skillName": "bun", "sourceRepo": "org/bun-skills", "sourcePath": "skills/bun"}
        ]"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.names(), vec!["bun"]);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let json = r#"{
            "bun": {"sourceRepo": "a/b", "sourcePath": "x"},
            "bun": {"sourceRepo": "c/d", "sourcePath": "y"}
        }"#;
        let err = serde_json::from_str::<Manifest>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate skill 'bun'"));
    }

    #[test]
    fn duplicate_array_names_are_rejected() {
        let json = r#"[
            {"skillName": "bun", "sourceRepo": "a/b", "sourcePath": "x"},
            {"skillName": "bun", "sourceRepo": "c/d", "sourcePath": "y"}
        ]"#;
        assert!(serde_json::from_str::<Manifest>(json).is_err());
    }

    #[test]
    fn array_entry_without_name_is_rejected() {
        let json = r#"[{"sourceRepo": "a/b", "sourcePath": "x"}]"#;
        let err = serde_json::from_str::<Manifest>(json).unwrap_err();
        assert!(err.to_string().contains("missing skillName"));
    }

    #[test]
    fn mismatched_skill_name_is_rejected() {
        let json = r#"{"bun": {"skillName": "deno", "sourceRepo": "a/b", "sourcePath": "x"}}"#;
        assert!(serde_json::from_str::<Manifest>(json).is_err());
    }

    #[test]
    fn insert_rejects_existing_name() {
        let mut manifest = Manifest::new();
        manifest.insert(ManifestEntry::new("bun", "a/b", "x")).unwrap();
        assert!(manifest.insert(ManifestEntry::new("bun", "c/d", "y")).is_err());
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn apply_merges_only_updated_results() {
        let mut manifest =
            Manifest::from_entries([ManifestEntry::new("bun", "a/b", "x").with_sha("abc123")]).unwrap();
        let now = Utc::now();

        assert!(!manifest.apply(&SyncResult::unchanged("bun", "abc123")));
        let err = SyncError::NotFound("gone".into());
        assert!(!manifest.apply(&SyncResult::failed("bun", &err)));
        assert_eq!(manifest.get("bun").unwrap().last_synced_sha.as_deref(), Some("abc123"));

        assert!(manifest.apply(&SyncResult::updated("bun", "def456", now, 3)));
        let entry = manifest.get("bun").unwrap();
        assert_eq!(entry.last_synced_sha.as_deref(), Some("def456"));
        assert_eq!(entry.last_synced_at, Some(now));
    }

    #[test]
    fn serializes_keyed_and_sorted() {
        let manifest = Manifest::from_entries([
            ManifestEntry::new("zod", "a/b", "zod"),
            ManifestEntry::new("bun", "c/d", "bun"),
        ])
        .unwrap();
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.find("\"bun\"").unwrap() < json.find("\"zod\"").unwrap());
        assert!(!json.contains("skillName"));
    }
}
