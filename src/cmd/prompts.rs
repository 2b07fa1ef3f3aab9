//! Confirmation prompts and status lines for the CLI

use crate::error::Result;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};

/// Prompt for yes/no confirmation with a default value
pub fn confirm(message: &str, default: bool) -> Result<bool> {
    let result = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(message)
        .default(default)
        .interact()?;
    Ok(result)
}

/// `confirm`, unless `--yes` was passed
pub fn confirm_unless(skip: bool, message: &str) -> Result<bool> {
    if skip {
        return Ok(true);
    }
    confirm(message, false)
}

pub fn section_header(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
}

pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn info(message: &str) {
    println!("{} {}", "→".cyan(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", "!".yellow().bold(), message);
}

pub fn error(message: &str) {
    println!("{} {}", "✗".red().bold(), message);
}
