use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use colored::{ColoredString, Colorize};
use tracing::debug;

use talqena_core::{
    AiModel, BadgeColor, Category, ImageField, ImportOptions, Library, LibraryError, PromptDraft,
    PromptFilter, PromptRecord, Selection,
};

use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List prompts, newest first
    List {
        /// Case-insensitive search over title, content and tags
        #[arg(short, long)]
        search: Option<String>,

        /// Only prompts in this category
        #[arg(short, long)]
        category: Option<Category>,

        /// Only prompts written for this model
        #[arg(short, long)]
        model: Option<AiModel>,

        /// Only favorites
        #[arg(long)]
        favorites: bool,

        /// Only prompts carrying this exact tag
        #[arg(long)]
        tag: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one prompt in full
    Show {
        /// Prompt ID (launches interactive picker if omitted)
        id: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a prompt
    Add {
        #[arg(short, long)]
        title: String,

        #[arg(long)]
        content: String,

        #[command(flatten)]
        fields: PromptFields,

        /// Mark as favorite
        #[arg(long)]
        favorite: bool,
    },

    /// Edit a prompt in place
    Edit {
        /// Prompt ID (launches interactive picker if omitted)
        id: Option<String>,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(long)]
        content: Option<String>,

        #[command(flatten)]
        fields: PromptFields,

        /// Remove a tag (repeatable)
        #[arg(long = "untag")]
        untag: Vec<String>,

        /// Drop the attached image
        #[arg(long, conflicts_with = "image")]
        remove_image: bool,
    },

    /// Delete a prompt and its image
    Delete {
        /// Prompt ID (launches interactive picker if omitted)
        id: Option<String>,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete every prompt and every stored image
    DeleteAll {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Import one prompt per non-empty line of a text file
    Import {
        file: PathBuf,

        #[arg(short, long, default_value = "Other")]
        category: Category,

        #[arg(short, long)]
        description: Option<String>,

        /// Tag applied to every imported prompt (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Toggle the favorite flag
    Favorite {
        /// Prompt ID (launches interactive picker if omitted)
        id: Option<String>,
    },

    /// List every tag in use
    Tags {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete stored images no prompt refers to
    Cleanup,

    /// Ask the rewrite assistant for a better version of a prompt
    Enhance {
        /// Prompt ID (launches interactive picker if omitted)
        id: Option<String>,

        /// Save the rewritten text as the prompt's content
        #[arg(long)]
        apply: bool,
    },
}

/// Optional fields shared by `add` and `edit`.
#[derive(Args, Debug, Default)]
pub struct PromptFields {
    #[arg(short, long)]
    description: Option<String>,

    #[arg(short, long)]
    category: Option<Category>,

    #[arg(short, long)]
    model: Option<AiModel>,

    /// Add a tag (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Attach an image file
    #[arg(long)]
    image: Option<PathBuf>,
}

impl PromptFields {
    fn apply_to(&self, draft: &mut PromptDraft) {
        if let Some(ref description) = self.description {
            draft.description = Some(description.clone());
        }
        if let Some(category) = self.category {
            draft.category = category;
        }
        if let Some(model) = self.model {
            draft.model = Some(model);
        }
        for tag in &self.tags {
            draft.add_tag(tag);
        }
    }
}

pub async fn run(command: Command, library: &mut Library, config: &Config) -> Result<()> {
    match command {
        Command::List {
            search,
            category,
            model,
            favorites,
            tag,
            json,
        } => {
            let filter = build_filter(search, category, model, favorites, tag);
            let visible = library.filtered(&filter);

            if json {
                println!("{}", serde_json::to_string_pretty(&visible)?);
            } else if visible.is_empty() {
                println!("{}", "No prompts found.".dimmed());
            } else {
                print_prompts_table(&visible);
            }
        }
        Command::Show { id, json } => {
            let id = resolve_prompt_id(library, id)?;
            let record = find(library, &id)?;

            if json {
                println!("{}", serde_json::to_string_pretty(record)?);
            } else {
                print_prompt_detail(library, record);
            }
        }
        Command::Add {
            title,
            content,
            fields,
            favorite,
        } => {
            let mut draft = PromptDraft::new(title, content);
            draft.is_favorite = favorite;
            fields.apply_to(&mut draft);
            if let Some(ref path) = fields.image {
                draft.image = stage_file(library, path).await?;
            }

            let record = library.create(draft).await.map_err(surface)?;
            println!("{} {}", "Created".bright_green(), record.id);
        }
        Command::Edit {
            id,
            title,
            content,
            fields,
            untag,
            remove_image,
        } => {
            let id = resolve_prompt_id(library, id)?;
            let mut draft = PromptDraft::from_record(find(library, &id)?);

            if let Some(title) = title {
                draft.title = title;
            }
            if let Some(content) = content {
                draft.content = content;
            }
            fields.apply_to(&mut draft);
            for tag in &untag {
                draft.remove_tag(tag);
            }
            if remove_image {
                draft.image = ImageField::Remove;
            } else if let Some(ref path) = fields.image {
                draft.image = stage_file(library, path).await?;
            }

            let record = library.update(&id, draft).await.map_err(surface)?;
            println!("{} {}", "Updated".bright_green(), record.id);
        }
        Command::Delete { id, yes } => {
            let id = resolve_prompt_id(library, id)?;
            let title = find(library, &id)?.title.clone();

            if !yes && !confirm(&format!("Delete \"{}\"?", title))? {
                println!("{}", "Cancelled.".dimmed());
                return Ok(());
            }

            library.delete(&id).await.map_err(surface)?;
            println!("{} {}", "Deleted".bright_red(), title);
        }
        Command::DeleteAll { yes } => {
            let prompt = format!(
                "Delete all {} prompts and their images? This cannot be undone.",
                library.len()
            );
            if !yes && !confirm(&prompt)? {
                println!("{}", "Cancelled.".dimmed());
                return Ok(());
            }

            let removed = library.delete_all().await.map_err(surface)?;
            println!("{} {} prompts", "Deleted".bright_red(), removed);
        }
        Command::Import {
            file,
            category,
            description,
            tags,
        } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let mut options = ImportOptions::new(category);
            options.description = description;
            for tag in &tags {
                options.add_tag(tag);
            }

            let count = library.bulk_import(&text, &options).map_err(surface)?;
            println!(
                "{} {} prompts into {}",
                "Imported".bright_green(),
                count,
                category_badge(category, category.label())
            );
        }
        Command::Favorite { id } => {
            let id = resolve_prompt_id(library, id)?;
            let favorite = library.toggle_favorite(&id).map_err(surface)?;
            if favorite {
                println!("{} Added to favorites", "★".bright_yellow());
            } else {
                println!("{} Removed from favorites", "☆".dimmed());
            }
        }
        Command::Tags { json } => {
            let tags = library.available_tags();
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else if tags.is_empty() {
                println!("{}", "No tags yet.".dimmed());
            } else {
                for tag in &tags {
                    println!("#{}", tag);
                }
            }
        }
        Command::Cleanup => {
            let removed = library.reconcile().await.map_err(surface)?;
            println!("Removed {} orphaned images", removed);
        }
        Command::Enhance { id, apply } => {
            let id = resolve_prompt_id(library, id)?;
            let record = find(library, &id)?.clone();
            let rewriter = config.rewriter();

            eprintln!(
                "{}",
                format!("Enhancing with {}...", rewriter.binary_path().display()).dimmed()
            );
            let enhanced = library
                .enhance(&rewriter, &record.content)
                .await
                .map_err(surface)?;

            println!("{}", enhanced);

            if apply && enhanced != record.content {
                let mut draft = PromptDraft::from_record(&record);
                draft.content = enhanced;
                library.update(&id, draft).await.map_err(surface)?;
                eprintln!("{} {}", "Updated".bright_green(), id);
            }
        }
    }

    Ok(())
}

fn build_filter(
    search: Option<String>,
    category: Option<Category>,
    model: Option<AiModel>,
    favorites_only: bool,
    tag: Option<String>,
) -> PromptFilter {
    PromptFilter {
        search: search.unwrap_or_default(),
        category: category.map_or(Selection::All, Selection::Only),
        model: model.map_or(Selection::All, Selection::Only),
        favorites_only,
        tag,
    }
}

/// Convert a library error into the message shown to the user.
fn surface(err: LibraryError) -> anyhow::Error {
    debug!(category = err.category(), error = %err, "Operation failed");
    anyhow!(err.user_message())
}

fn find<'a>(library: &'a Library, id: &str) -> Result<&'a PromptRecord> {
    library
        .get(id)
        .ok_or_else(|| anyhow!("Prompt not found: {}", id))
}

async fn stage_file(library: &mut Library, path: &Path) -> Result<ImageField> {
    let payload = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    let staging_id = library.stage_image(payload).await.map_err(surface)?;
    Ok(ImageField::Staged(staging_id))
}

fn confirm(prompt: &str) -> Result<bool> {
    Ok(dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

fn resolve_prompt_id(library: &Library, id: Option<String>) -> Result<String> {
    if let Some(id) = id {
        return Ok(id);
    }

    // Interactive picker
    if library.is_empty() {
        anyhow::bail!("No prompts found.");
    }

    let items: Vec<String> = library
        .records()
        .iter()
        .map(|r| {
            format!(
                "{} | {:16} | {}",
                format_millis(r.updated_at),
                r.category.label(),
                truncate(&r.title, 60)
            )
        })
        .collect();

    let selection = dialoguer::FuzzySelect::new()
        .with_prompt("Select a prompt")
        .items(&items)
        .default(0)
        .interact()?;

    Ok(library.records()[selection].id.clone())
}

fn print_prompts_table(records: &[&PromptRecord]) {
    println!(
        "{:<36} {:<18} {:<3} {:<16} {}",
        "ID".dimmed(),
        "CATEGORY".dimmed(),
        "FAV".dimmed(),
        "UPDATED".dimmed(),
        "TITLE".dimmed(),
    );

    for r in records {
        let category = category_badge(r.category, &format!("{:<18}", r.category.label()));
        let favorite = if r.is_favorite {
            "★  ".bright_yellow()
        } else {
            "   ".normal()
        };
        let mut title = truncate(&r.title, 50);
        if r.has_image() {
            title.push_str(" [img]");
        }

        println!(
            "{:<36} {} {} {:<16} {}",
            r.id,
            category,
            favorite,
            format_millis(r.updated_at),
            title
        );
    }
}

fn print_prompt_detail(library: &Library, record: &PromptRecord) {
    println!("{}", format!("=== {} ===", record.title).bright_blue().bold());
    println!("{}  {}", "ID:".dimmed(), record.id);
    println!(
        "{}  {}",
        "Category:".dimmed(),
        category_badge(record.category, record.category.label())
    );
    if let Some(model) = record.model {
        println!("{}  {}", "Model:".dimmed(), model);
    }
    if let Some(ref description) = record.description {
        println!("{}  {}", "Description:".dimmed(), description);
    }
    if !record.tags.is_empty() {
        let tags: Vec<String> = record.tags.iter().map(|t| format!("#{}", t)).collect();
        println!("{}  {}", "Tags:".dimmed(), tags.join(" "));
    }
    println!("{}  {}", "Favorite:".dimmed(), if record.is_favorite { "yes" } else { "no" });
    println!("{}  {}", "Created:".dimmed(), format_millis(record.created_at));
    println!("{}  {}", "Updated:".dimmed(), format_millis(record.updated_at));

    match library.image_handle(&record.id) {
        Some(handle) => {
            let size = library.resolve_handle(handle).map_or(0, |b| b.len());
            println!("{}  {} ({} bytes)", "Image:".dimmed(), handle, size);
        }
        None if record.has_image() => {
            println!("{}  {}", "Image:".dimmed(), "unavailable".bright_red());
        }
        None => {}
    }

    println!();
    println!("{}", record.content);
}

fn category_badge(category: Category, text: &str) -> ColoredString {
    match category.style().color {
        BadgeColor::Blue => text.bright_blue(),
        BadgeColor::Purple => text.bright_magenta(),
        BadgeColor::Green => text.bright_green(),
        BadgeColor::Orange => text.bright_yellow(),
        BadgeColor::Gray => text.bright_black(),
    }
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() > max_chars {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}
