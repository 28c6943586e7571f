//! The persisted prompt record and its closed enumerations.
//!
//! Field names and enum values here are the wire contract for the
//! metadata key; renaming any of them breaks existing libraries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stored prompt record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<AiModel>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Key of the owning image blob; always the record's own id when set.
    #[serde(default, alias = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub is_favorite: bool,
}

impl PromptRecord {
    pub fn has_image(&self) -> bool {
        self.image_ref.is_some()
    }
}

/// Prompt category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Coding")]
    Coding,
    #[serde(rename = "Creative Writing")]
    Writing,
    #[serde(rename = "Art Generation")]
    Art,
    #[serde(rename = "Business")]
    Business,
    #[serde(rename = "Education")]
    Education,
    #[serde(rename = "Data Analysis")]
    Data,
    #[default]
    #[serde(rename = "Other")]
    Other,
}

/// Badge colour used when rendering a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeColor {
    Blue,
    Purple,
    Green,
    Orange,
    Gray,
}

/// Display metadata for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryStyle {
    pub color: BadgeColor,
    /// Two-stop gradient, start and end as hex colours.
    pub gradient: (&'static str, &'static str),
}

impl Category {
    /// Every category, in sidebar order.
    pub const ALL: [Category; 7] = [
        Category::Coding,
        Category::Writing,
        Category::Art,
        Category::Business,
        Category::Education,
        Category::Data,
        Category::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Coding => "Coding",
            Category::Writing => "Creative Writing",
            Category::Art => "Art Generation",
            Category::Business => "Business",
            Category::Education => "Education",
            Category::Data => "Data Analysis",
            Category::Other => "Other",
        }
    }

    pub fn style(self) -> CategoryStyle {
        match self {
            Category::Coding => CategoryStyle {
                color: BadgeColor::Blue,
                gradient: ("#3b82f6", "#06b6d4"),
            },
            Category::Art => CategoryStyle {
                color: BadgeColor::Purple,
                gradient: ("#a855f7", "#ec4899"),
            },
            Category::Writing => CategoryStyle {
                color: BadgeColor::Green,
                gradient: ("#22c55e", "#10b981"),
            },
            Category::Business => CategoryStyle {
                color: BadgeColor::Orange,
                gradient: ("#f97316", "#f59e0b"),
            },
            Category::Education | Category::Data | Category::Other => CategoryStyle {
                color: BadgeColor::Gray,
                gradient: ("#64748b", "#475569"),
            },
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coding" | "code" => Ok(Category::Coding),
            "creative writing" | "writing" => Ok(Category::Writing),
            "art generation" | "art" => Ok(Category::Art),
            "business" => Ok(Category::Business),
            "education" => Ok(Category::Education),
            "data analysis" | "data" => Ok(Category::Data),
            "other" => Ok(Category::Other),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Model a prompt was written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AiModel {
    #[serde(rename = "Gemini 2.5 Flash")]
    Gemini25Flash,
    #[serde(rename = "Gemini 3.0 Pro")]
    Gemini3Pro,
    #[serde(rename = "GPT-4")]
    Gpt4,
    #[serde(rename = "Claude 3.5 Sonnet")]
    Claude35Sonnet,
    #[serde(rename = "Mistral Large")]
    MistralLarge,
    #[serde(rename = "Midjourney")]
    Midjourney,
    #[serde(rename = "Other")]
    Other,
}

impl AiModel {
    pub const ALL: [AiModel; 7] = [
        AiModel::Gemini25Flash,
        AiModel::Gemini3Pro,
        AiModel::Gpt4,
        AiModel::Claude35Sonnet,
        AiModel::MistralLarge,
        AiModel::Midjourney,
        AiModel::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AiModel::Gemini25Flash => "Gemini 2.5 Flash",
            AiModel::Gemini3Pro => "Gemini 3.0 Pro",
            AiModel::Gpt4 => "GPT-4",
            AiModel::Claude35Sonnet => "Claude 3.5 Sonnet",
            AiModel::MistralLarge => "Mistral Large",
            AiModel::Midjourney => "Midjourney",
            AiModel::Other => "Other",
        }
    }
}

impl fmt::Display for AiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AiModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        AiModel::ALL
            .into_iter()
            .find(|m| m.label().to_lowercase() == wanted)
            .ok_or_else(|| format!("Unknown model: {}", s))
    }
}
