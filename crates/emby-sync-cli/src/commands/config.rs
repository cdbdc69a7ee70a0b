use super::Context;
use crate::output::Output;
use crate::ConfigCommands;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::{Attribute, Cell, Table};
use serde_json::json;

pub fn run_config(ctx: &Context, cmd: ConfigCommands, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show { full } => show_config(ctx, full, output),
        ConfigCommands::Path => show_paths(ctx, output),
    }
}

fn show_config(ctx: &Context, full: bool, output: &Output) -> Result<()> {
    let config = ctx.read_config()?;
    let config = if full { config } else { config.redacted() };

    if output.is_human() {
        let text = toml::to_string_pretty(&config).map_err(|e| eyre!("Failed to render configuration: {}", e))?;
        output.info(format!("# {}", ctx.paths().config_file().display()));
        output.info(text);
        if let Err(e) = config.validate() {
            output.warn(format!("Configuration problem: {}", e));
        }
    } else {
        output.report(&config);
    }
    Ok(())
}

fn show_paths(ctx: &Context, output: &Output) -> Result<()> {
    let paths = ctx.paths();
    let rows = [
        ("Config", paths.config_file()),
        ("Snapshot", paths.snapshot_file()),
        ("Unmatched ledger", paths.unmatched_file()),
        ("Log file (with --log-file)", paths.log_file()),
    ];

    if !output.is_human() {
        let map: serde_json::Map<String, serde_json::Value> = rows
            .iter()
            .map(|(name, path)| (name.to_string(), json!(path.display().to_string())))
            .collect();
        output.report(&map);
        return Ok(());
    }
    if output.is_quiet() {
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("File").add_attribute(Attribute::Bold),
        Cell::new("Path").add_attribute(Attribute::Bold),
    ]);
    for (name, path) in &rows {
        let exists = if path.exists() { "" } else { " (missing)" };
        table.add_row(vec![Cell::new(name), Cell::new(format!("{}{}", path.display(), exists))]);
    }
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    println!("{}", table);
    Ok(())
}
