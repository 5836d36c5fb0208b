//! Saved question answers, persisted between sessions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::TatttyError;

/// The two narrative questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum QuestionKey {
    Q1,
    Q2,
}

impl QuestionKey {
    /// Namespace used for selection badges.
    #[must_use]
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Q1 => "q1",
            Self::Q2 => "q2",
        }
    }

    fn storage_key(self) -> String {
        format!("tattty:{}", self.namespace())
    }
}

/// JSON file holding the latest answer per question.
pub struct AnswerStore {
    path: PathBuf,
}

impl AnswerStore {
    /// Create a store backed by the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Saved answer, if any.
    pub async fn get(&self, key: QuestionKey) -> Option<String> {
        self.read_all().await.remove(&key.storage_key()).filter(|v| !v.is_empty())
    }

    /// Store an answer, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, key: QuestionKey, text: &str) -> Result<(), TatttyError> {
        let mut all = self.read_all().await;
        all.insert(key.storage_key(), text.to_string());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(&all)?).await?;
        Ok(())
    }

    async fn read_all(&self) -> BTreeMap<String, String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = AnswerStore::new(dir.path().join("sub/answers.json"));

        assert!(store.get(QuestionKey::Q1).await.is_none());
        store.save(QuestionKey::Q1, "first story").await.unwrap();
        store.save(QuestionKey::Q2, "second story").await.unwrap();
        store.save(QuestionKey::Q1, "rewritten").await.unwrap();

        assert_eq!(store.get(QuestionKey::Q1).await.as_deref(), Some("rewritten"));
        assert_eq!(store.get(QuestionKey::Q2).await.as_deref(), Some("second story"));

        let raw = std::fs::read_to_string(dir.path().join("sub/answers.json")).unwrap();
        assert!(raw.contains("tattty:q1"));
    }
}
