//! Visible-subset computation over the prompt collection.

use talqena_db::{AiModel, Category, PromptRecord};

/// Either every value or one specific value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<T> {
    All,
    Only(T),
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Selection::All
    }
}

impl<T: PartialEq> Selection<T> {
    pub fn accepts(&self, value: &T) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(wanted) => wanted == value,
        }
    }
}

/// Filter criteria for listing prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptFilter {
    /// Case-insensitive substring matched against title, content and tags.
    pub search: String,
    pub category: Selection<Category>,
    pub model: Selection<AiModel>,
    pub favorites_only: bool,
    /// Exact tag match. An empty tag filters nothing.
    pub tag: Option<String>,
}

impl PromptFilter {
    pub fn matches(&self, record: &PromptRecord) -> bool {
        if !self.search.is_empty() {
            let needle = self.search.to_lowercase();
            let hit = record.title.to_lowercase().contains(&needle)
                || record.content.to_lowercase().contains(&needle)
                || record
                    .tags
                    .iter()
                    .any(|t| t.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }

        if !self.category.accepts(&record.category) {
            return false;
        }

        if let Selection::Only(model) = self.model {
            if record.model != Some(model) {
                return false;
            }
        }

        if self.favorites_only && !record.is_favorite {
            return false;
        }

        if let Some(ref tag) = self.tag {
            if !tag.is_empty() && !record.tags.iter().any(|t| t == tag) {
                return false;
            }
        }

        true
    }
}

/// Records matching `filter`, in collection order.
pub fn filter_prompts<'a>(records: &'a [PromptRecord], filter: &PromptFilter) -> Vec<&'a PromptRecord> {
    records.iter().filter(|r| filter.matches(r)).collect()
}

/// Every tag in the collection, de-duplicated in first-seen order.
pub fn available_tags(records: &[PromptRecord]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in records.iter().flat_map(|r| r.tags.iter()) {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}
