use crate::actions::{Action, Outcome};
use crate::cmd::{progress, split_values, Connection};
use crate::directory::ResolutionResult;
use crate::error::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

#[derive(Subcommand, Debug)]
pub enum UsersCommands {
    /// Resolve user IDs, UPNs or display names to object IDs
    Resolve(ResolveArgs),
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Users to resolve (repeatable or comma-separated)
    #[arg(required = true)]
    pub users: Vec<String>,
}

pub async fn run(cmd: UsersCommands) -> Result<()> {
    let conn = Connection::open()?;
    conn.print_tenant();

    match cmd {
        UsersCommands::Resolve(args) => resolve(&conn, args).await,
    }
}

async fn resolve(conn: &Connection, args: ResolveArgs) -> Result<()> {
    let inputs = split_values(&args.users);
    let outcome = progress::with_spinner(
        "Resolving users...",
        "Lookup finished",
        conn.dispatch(Action::ResolveUsers { inputs }),
    )
    .await?;

    if let Outcome::Resolution(result) = outcome {
        render_resolution(&result);
    }
    Ok(())
}

pub fn render_resolution(result: &ResolutionResult) {
    if !result.resolved_ids.is_empty() {
        println!("\n{}", "Resolved:".bold());
        for id in &result.resolved_ids {
            println!("  {} {}", "✓".green(), id);
        }
    }
    if !result.unresolved.is_empty() {
        println!("\n{}", "Not resolved:".bold());
        for input in &result.unresolved {
            println!("  {} {}", "✗".red(), input);
        }
    }
    println!(
        "\n{} {} resolved, {} not resolved",
        "→".cyan(),
        result.resolved_ids.len(),
        result.unresolved.len()
    );
}
