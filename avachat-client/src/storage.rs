//! Per-locale conversation ids persisted between runs.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use shared::{config::StorageConfig, models::Locale};
use tracing::{debug, info, warn};

use crate::error::ClientResult;

/// What a language switch leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocaleSwitch {
    /// A conversation was already held in the target language.
    Resume(String),
    /// The target language has no conversation yet.
    Fresh,
}

/// JSON file mapping `<namespace>_<locale>_sessionId` keys to conversation
/// ids. Keys of other namespaces in the same file are left alone.
#[derive(Debug, Clone)]
pub struct ConversationStorage {
    path: PathBuf,
    namespace: String,
}

impl ConversationStorage {
    /// Storage backed by the JSON file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace: namespace.into(),
        }
    }

    /// Storage at the configured or default location.
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.resolved_path(), config.namespace.clone())
    }

    /// File backing this storage.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key under which the id for `locale` is stored.
    #[must_use]
    pub fn key(&self, locale: Locale) -> String {
        format!("{}_{}_sessionId", self.namespace, locale.as_str())
    }

    /// Stored conversation id for `locale`. Unreadable storage reads as empty.
    #[must_use]
    pub fn get(&self, locale: Locale) -> Option<String> {
        self.read_map().remove(&self.key(locale))
    }

    /// Remembers `conversation_id` as the conversation held in `locale`.
    ///
    /// # Errors
    /// Returns an error when the file cannot be written.
    pub fn set(&self, locale: Locale, conversation_id: &str) -> ClientResult<()> {
        let mut map = self.read_map();
        map.insert(self.key(locale), conversation_id.to_string());
        self.write_map(&map)?;
        info!(%locale, conversation_id, "stored conversation id");
        Ok(())
    }

    /// Forgets the conversation held in `locale`.
    ///
    /// # Errors
    /// Returns an error when the file cannot be written.
    pub fn clear(&self, locale: Locale) -> ClientResult<()> {
        let mut map = self.read_map();
        if map.remove(&self.key(locale)).is_some() {
            self.write_map(&map)?;
            info!(%locale, "cleared conversation id");
        }
        Ok(())
    }

    /// Forgets the conversations of every locale.
    ///
    /// # Errors
    /// Returns an error when the file cannot be written.
    pub fn clear_all(&self) -> ClientResult<()> {
        let mut map = self.read_map();
        let before = map.len();
        for locale in Locale::ALL {
            map.remove(&self.key(locale));
        }
        if map.len() != before {
            self.write_map(&map)?;
        }
        info!("cleared all conversation ids");
        Ok(())
    }

    /// Every stored conversation, in locale order.
    #[must_use]
    pub fn entries(&self) -> Vec<(Locale, String)> {
        let map = self.read_map();
        Locale::ALL
            .into_iter()
            .filter_map(|locale| map.get(&self.key(locale)).map(|id| (locale, id.clone())))
            .collect()
    }

    /// Decides where a switch to `target` lands.
    #[must_use]
    pub fn switch_to(&self, target: Locale) -> LocaleSwitch {
        self.get(target)
            .filter(|id| !id.trim().is_empty())
            .map_or(LocaleSwitch::Fresh, LocaleSwitch::Resume)
    }

    fn read_map(&self) -> BTreeMap<String, String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read conversation storage");
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(path = %self.path.display(), error = %err, "ignoring corrupt conversation storage");
            BTreeMap::new()
        })
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> ClientResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(map)?)?;
        debug!(path = %self.path.display(), entries = map.len(), "conversation storage written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> ConversationStorage {
        ConversationStorage::new(dir.path().join("nested").join("ids.json"), "chat")
    }

    #[test]
    fn keys_follow_namespace_and_locale() {
        let storage = ConversationStorage::new("ids.json", "chat");
        assert_eq!(storage.key(Locale::En), "chat_en_sessionId");
        assert_eq!(storage.key(Locale::Ja), "chat_ja_sessionId");
    }

    #[test]
    fn ids_are_kept_per_locale() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        storage.set(Locale::En, "en-1").unwrap();
        storage.set(Locale::Ja, "ja-1").unwrap();

        assert_eq!(storage.get(Locale::En).as_deref(), Some("en-1"));
        assert_eq!(storage.get(Locale::Ja).as_deref(), Some("ja-1"));
        assert_eq!(
            storage.entries(),
            vec![(Locale::En, "en-1".to_string()), (Locale::Ja, "ja-1".to_string())]
        );
    }

    #[test]
    fn clear_removes_only_one_locale() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.set(Locale::En, "en-1").unwrap();
        storage.set(Locale::Ja, "ja-1").unwrap();

        storage.clear(Locale::En).unwrap();

        assert_eq!(storage.get(Locale::En), None);
        assert_eq!(storage.get(Locale::Ja).as_deref(), Some("ja-1"));
    }

    #[test]
    fn clear_all_keeps_other_namespaces() {
        let dir = TempDir::new().unwrap();
        let ours = storage(&dir);
        let theirs = ConversationStorage::new(ours.path(), "demo");
        ours.set(Locale::En, "en-1").unwrap();
        ours.set(Locale::Ja, "ja-1").unwrap();
        theirs.set(Locale::En, "demo-1").unwrap();

        ours.clear_all().unwrap();

        assert!(ours.entries().is_empty());
        assert_eq!(theirs.get(Locale::En).as_deref(), Some("demo-1"));
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_repaired_on_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids.json");
        fs::write(&path, "{not json").unwrap();
        let storage = ConversationStorage::new(&path, "chat");

        assert_eq!(storage.get(Locale::En), None);
        storage.set(Locale::En, "en-1").unwrap();
        assert_eq!(storage.get(Locale::En).as_deref(), Some("en-1"));
    }

    #[test]
    fn switching_language_resumes_a_stored_conversation() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.set(Locale::Ja, "ja-1").unwrap();

        assert_eq!(storage.switch_to(Locale::Ja), LocaleSwitch::Resume("ja-1".to_string()));
        assert_eq!(storage.switch_to(Locale::En), LocaleSwitch::Fresh);
    }
}
