//! Form data for creating, editing and importing prompts.

use talqena_db::{AiModel, Category, PromptRecord};

/// What a save should do with the prompt's image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageField {
    /// Leave the current image (or lack of one) alone.
    #[default]
    Keep,
    /// Attach the image uploaded under this staging id.
    Staged(String),
    /// Drop the current image.
    Remove,
}

/// Editable fields of a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptDraft {
    pub title: String,
    pub content: String,
    pub description: Option<String>,
    pub category: Category,
    pub model: Option<AiModel>,
    pub tags: Vec<String>,
    pub is_favorite: bool,
    pub image: ImageField,
}

impl PromptDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Draft pre-filled from an existing record, keeping its image.
    pub fn from_record(record: &PromptRecord) -> Self {
        Self {
            title: record.title.clone(),
            content: record.content.clone(),
            description: record.description.clone(),
            category: record.category,
            model: record.model,
            tags: record.tags.clone(),
            is_favorite: record.is_favorite,
            image: ImageField::Keep,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_model(mut self, model: AiModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            self.add_tag(tag.as_ref());
        }
        self
    }

    pub fn with_image(mut self, image: ImageField) -> Self {
        self.image = image;
        self
    }

    pub fn favorite(mut self) -> Self {
        self.is_favorite = true;
        self
    }

    /// Add a trimmed tag. Returns false for blank or duplicate tags.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        push_unique_tag(&mut self.tags, tag)
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    /// Description with blank input treated as absent.
    pub(crate) fn normalized_description(&self) -> Option<String> {
        normalize_description(self.description.as_deref())
    }
}

/// Settings applied to every prompt in a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOptions {
    pub category: Category,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl ImportOptions {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            ..Default::default()
        }
    }

    pub fn add_tag(&mut self, tag: &str) -> bool {
        push_unique_tag(&mut self.tags, tag)
    }
}

pub(crate) fn push_unique_tag(tags: &mut Vec<String>, tag: &str) -> bool {
    let tag = tag.trim();
    if tag.is_empty() || tags.iter().any(|t| t == tag) {
        return false;
    }
    tags.push(tag.to_string());
    true
}

pub(crate) fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}
