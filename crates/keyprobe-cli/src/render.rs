//! Terminal output: tables, status lines and chat headers

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use keyprobe_shared::{KeyprobeError, ModelInfo, ProviderConfig, ProviderId, ValidationResult};

const DESCRIPTION_WIDTH: usize = 50;
const MASK_VISIBLE: usize = 4;

/// Hide an API key for display.
///
/// Keys of 12 characters or fewer are masked entirely, longer ones keep four
/// characters at each end.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= MASK_VISIBLE * 3 {
        return "*".repeat(chars.len());
    }

    let head: String = chars[..MASK_VISIBLE].iter().collect();
    let tail: String = chars[chars.len() - MASK_VISIBLE..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - MASK_VISIBLE * 2), tail)
}

/// Cut descriptions longer than the table width to 47 characters plus `...`
pub fn truncate_description(description: &str) -> String {
    if description.chars().count() <= DESCRIPTION_WIDTH {
        return description.to_string();
    }

    let cut: String = description.chars().take(DESCRIPTION_WIDTH - 3).collect();
    format!("{}...", cut)
}

/// Summary of the settings a `list` run is about to use
pub fn provider_panel(provider: ProviderId, config: &ProviderConfig) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Provider Configuration").fg(Color::Cyan),
        Cell::new(""),
    ]);
    table.add_row(vec![Cell::new("Provider"), Cell::new(provider.to_string())]);
    table.add_row(vec![
        Cell::new("API Key"),
        Cell::new(mask_api_key(&config.api_key)),
    ]);
    table.add_row(vec![
        Cell::new("Base URL"),
        Cell::new(config.base_url.as_deref().unwrap_or("(default)")),
    ]);
    table
}

pub fn models_table(models: &[ModelInfo]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Model ID").fg(Color::Cyan),
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("Description").fg(Color::Cyan),
    ]);

    for model in models {
        table.add_row(vec![
            Cell::new(&model.id),
            Cell::new(model.name.as_deref().unwrap_or("-")),
            Cell::new(
                model
                    .description
                    .as_deref()
                    .map(truncate_description)
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    table
}

pub fn model_total(count: usize) -> String {
    let noun = if count == 1 { "model" } else { "models" };
    format!("Total: {} {}", count, noun).bold().to_string()
}

pub fn validation_line(provider: ProviderId, result: &ValidationResult) -> String {
    let message = result.message.as_deref().unwrap_or_default();
    if result.ok {
        format!("{} {}: {}", "✓".green().bold(), provider, message.green())
    } else {
        format!("{} {}: {}", "✗".red().bold(), provider, message.red())
    }
}

/// One-line report of a failed call, naming provider and error kind
pub fn error_block(provider: ProviderId, error: &KeyprobeError) -> String {
    format!(
        "{} {} [{}]: {}",
        "✗".red().bold(),
        provider,
        error.kind(),
        error.to_string().red()
    )
}

pub fn chat_header(provider: ProviderId, model: &str) -> String {
    format!("── {} ({}) ──", provider, model).cyan().bold().to_string()
}
