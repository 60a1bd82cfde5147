use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Read-only view of the external word catalog.
///
/// The scheduler only references words by id; spelling and list membership
/// live in the content store.
pub trait ContentStore: Send + Sync {
    fn spelling(&self, word_id: &str) -> Option<String>;

    fn words_in_list(&self, list_id: &str) -> Vec<String>;

    /// List the word belongs to, if any.
    fn list_of(&self, word_id: &str) -> Option<String>;

    fn word_exists(&self, word_id: &str) -> bool {
        self.spelling(word_id).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogWord {
    pub word_id: String,
    pub spelling: String,
    #[serde(default)]
    pub list_id: Option<String>,
}

/// Catalog held in memory, loaded from a JSON array of [`CatalogWord`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryContentStore {
    words: HashMap<String, CatalogWord>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_words(words: impl IntoIterator<Item = CatalogWord>) -> Self {
        let mut store = Self::new();
        for word in words {
            store.insert(word);
        }
        store
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let words: Vec<CatalogWord> = serde_json::from_str(json)?;
        Ok(Self::from_words(words))
    }

    pub fn insert(&mut self, word: CatalogWord) {
        self.words.insert(word.word_id.clone(), word);
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl ContentStore for InMemoryContentStore {
    fn spelling(&self, word_id: &str) -> Option<String> {
        self.words.get(word_id).map(|w| w.spelling.clone())
    }

    fn list_of(&self, word_id: &str) -> Option<String> {
        self.words.get(word_id).and_then(|w| w.list_id.clone())
    }

    fn words_in_list(&self, list_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .words
            .values()
            .filter(|w| w.list_id.as_deref() == Some(list_id))
            .map(|w| w.word_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_catalog_from_json() {
        let store = InMemoryContentStore::from_json(
            r#"[
                {"word_id": "1", "spelling": "apple", "list_id": "unit-1"},
                {"word_id": "2", "spelling": "colour/color", "list_id": "unit-1"},
                {"word_id": "3", "spelling": "zebra"}
            ]"#,
        )
        .unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.spelling("2").as_deref(), Some("colour/color"));
        assert!(store.word_exists("3"));
        assert!(!store.word_exists("4"));
        assert_eq!(store.words_in_list("unit-1"), vec!["1", "2"]);
        assert!(store.words_in_list("unit-2").is_empty());
        assert_eq!(store.list_of("1").as_deref(), Some("unit-1"));
        assert_eq!(store.list_of("3"), None);
    }
}
