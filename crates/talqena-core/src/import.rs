//! Bulk import of newline-delimited prompt text.

use talqena_db::PromptRecord;
use uuid::Uuid;

use crate::draft::{normalize_description, push_unique_tag, ImportOptions};

/// Non-empty trimmed lines of `text`, in order.
pub fn parse_import_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Title given to the imported prompt at 1-based `position`.
pub fn imported_title(position: usize) -> String {
    format!("Imported Prompt {}", position)
}

/// Build one record per line. Timestamps are `base_time + index` so the
/// batch stays strictly ordered even when the clock has not moved.
pub fn build_import_batch(
    lines: &[String],
    options: &ImportOptions,
    base_time: i64,
) -> Vec<PromptRecord> {
    let description = normalize_description(options.description.as_deref());
    let mut tags = Vec::new();
    for tag in &options.tags {
        push_unique_tag(&mut tags, tag);
    }

    lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let stamp = base_time + index as i64;
            PromptRecord {
                id: Uuid::new_v4().to_string(),
                title: imported_title(index + 1),
                content: line.clone(),
                description: description.clone(),
                category: options.category,
                model: None,
                tags: tags.clone(),
                image_ref: None,
                created_at: stamp,
                updated_at: stamp,
                is_favorite: false,
            }
        })
        .collect()
}
