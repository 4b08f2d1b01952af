//! File-only commands: validate a contact table, preview a greeting.
//!
//! CHANGELOG:
//! - 10/07/2026 - render shows the per-recipient preview for a table
//! - 10/05/2026 - Initial implementation

use anyhow::{Context, Result};
use bainian_core::contacts::ContactTable;
use bainian_core::dispatch::template;
use bainian_core::Config;
use serde_json::json;
use std::path::Path;

use crate::output::OutputControls;

/// Check a contact table's header and summarize its recipient plan.
pub fn validate(path: &Path, config: &Config, output: &OutputControls) -> Result<()> {
    let table = ContactTable::read(path)
        .with_context(|| format!("Contact table {} is not usable", path.display()))?;
    let plan = table.plan(&config.defaults);

    if output.json {
        output.print(&json!({
            "success": true,
            "path": path,
            "rows": table.len(),
            "recipients": plan.tasks.len(),
            "skipped_marked": plan.skipped_marked,
            "skipped_nameless": plan.skipped_nameless,
        }));
    } else {
        println!("{}: {} rows", path.display(), table.len());
        println!("  recipients:          {}", plan.tasks.len());
        println!("  skipped (marked N):  {}", plan.skipped_marked);
        println!("  skipped (no name):   {}", plan.skipped_nameless);
    }
    Ok(())
}

/// Render the template for one title/honorific, or for every recipient of a table.
pub fn render(
    template_text: &str,
    title: Option<&str>,
    honorific: Option<&str>,
    table: Option<&Path>,
    config: &Config,
    output: &OutputControls,
) -> Result<()> {
    let Some(path) = table else {
        let title = title.unwrap_or(&config.defaults.title);
        let honorific = honorific.unwrap_or(&config.defaults.honorific);
        let message = template::render(template_text, title, honorific);
        if output.json {
            output.print(&json!({ "message": message }));
        } else {
            println!("{}", message);
        }
        return Ok(());
    };

    let plan = ContactTable::read(path)
        .with_context(|| format!("Contact table {} is not usable", path.display()))?
        .plan(&config.defaults);
    let previews: Vec<_> = plan
        .tasks
        .iter()
        .map(|task| {
            json!({
                "recipient": task.navigation_name(),
                "message": template::render(template_text, &task.title, &task.honorific),
            })
        })
        .collect();

    if output.json {
        output.print(&previews);
    } else {
        for preview in &previews {
            println!(
                "{}: {}",
                preview["recipient"].as_str().unwrap_or_default(),
                preview["message"].as_str().unwrap_or_default()
            );
        }
    }
    Ok(())
}
