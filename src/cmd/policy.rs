//! Conditional Access policy commands

use crate::actions::{Action, Outcome};
use crate::cmd::{progress, prompts, render_vanished, Connection};
use crate::directory::is_guid;
use crate::error::{CaError, Result};
use crate::graph::conditional_access::{ConditionalAccessPolicy, PolicyState};
use crate::graph::GraphService;
use clap::{Args, Subcommand};
use colored::Colorize;

#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// List Conditional Access policies
    List(ListArgs),
    /// Show one policy as JSON
    Show(PolicyArg),
    /// Create a disabled copy of a policy
    Clone(CloneArgs),
    /// Enable a policy
    Enable(PolicyArg),
    /// Disable a policy
    Disable(PolicyArg),
    /// Put a policy in report-only mode
    ReportOnly(PolicyArg),
    /// Delete one or more policies
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show IDs and modification dates
    #[arg(short, long)]
    pub detailed: bool,

    /// Filter by state (enabled, report-only, disabled)
    #[arg(long)]
    pub state: Option<String>,
}

#[derive(Args, Debug)]
pub struct PolicyArg {
    /// Policy ID or display name
    pub policy: String,
}

#[derive(Args, Debug)]
pub struct CloneArgs {
    /// Policy ID or display name to copy
    pub policy: String,

    /// Name for the copy (default: "Copy of <name>")
    #[arg(long, short = 'n')]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Policy IDs or display names
    #[arg(required = true)]
    pub policies: Vec<String>,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub async fn run(cmd: PolicyCommands) -> Result<()> {
    let conn = Connection::open()?;
    conn.print_tenant();

    match cmd {
        PolicyCommands::List(args) => list(&conn, args).await,
        PolicyCommands::Show(args) => show(&conn, args).await,
        PolicyCommands::Clone(args) => clone(&conn, args).await,
        PolicyCommands::Enable(args) => set_state(&conn, args, PolicyState::Enabled).await,
        PolicyCommands::Disable(args) => set_state(&conn, args, PolicyState::Disabled).await,
        PolicyCommands::ReportOnly(args) => {
            set_state(&conn, args, PolicyState::EnabledForReportingButNotEnforced).await
        }
        PolicyCommands::Delete(args) => delete(&conn, args).await,
    }
}

fn parse_state_filter(filter: &str) -> Result<PolicyState> {
    match filter.to_ascii_lowercase().as_str() {
        "enabled" => Ok(PolicyState::Enabled),
        "disabled" => Ok(PolicyState::Disabled),
        "report-only" | "reportonly" => Ok(PolicyState::EnabledForReportingButNotEnforced),
        other => Err(CaError::Validation(format!(
            "Unknown state '{}'. Use enabled, report-only or disabled",
            other
        ))),
    }
}

/// Policy matching `key` by ID first, then display name (case-insensitive)
pub fn find_policy<'a>(
    policies: &'a [ConditionalAccessPolicy],
    key: &str,
) -> Option<&'a ConditionalAccessPolicy> {
    let key = key.trim();
    policies
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(key))
        .or_else(|| policies.iter().find(|p| p.display_name.eq_ignore_ascii_case(key)))
}

/// Object IDs pass through untouched so a vanished policy still reaches
/// the action pipeline; names are looked up
async fn resolve_policy_id(conn: &Connection, key: &str) -> Result<String> {
    let key = key.trim();
    if is_guid(key) {
        return Ok(key.to_string());
    }
    let policies = conn.client.list_policies().await?;
    find_policy(&policies, key)
        .map(|p| p.id.clone())
        .ok_or_else(|| CaError::Validation(format!("No policy named '{}'", key)))
}

fn state_label(state: PolicyState) -> String {
    match state {
        PolicyState::Enabled => state.to_string().green().to_string(),
        PolicyState::EnabledForReportingButNotEnforced => state.to_string().yellow().to_string(),
        PolicyState::Disabled => state.to_string().red().to_string(),
    }
}

fn truncate_name(name: &str, max: usize) -> String {
    if name.chars().count() > max {
        let head: String = name.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}

fn date_part(timestamp: Option<&str>) -> &str {
    timestamp
        .and_then(|t| t.split('T').next())
        .unwrap_or("")
}

async fn list(conn: &Connection, args: ListArgs) -> Result<()> {
    let state_filter = args.state.as_deref().map(parse_state_filter).transpose()?;

    let outcome = progress::with_spinner(
        "Fetching Conditional Access policies...",
        "Fetched policies",
        conn.dispatch(Action::ListPolicies),
    )
    .await?;
    let Outcome::Policies(policies) = outcome else {
        return Ok(());
    };

    if policies.is_empty() {
        println!("\n{} No Conditional Access policies found", "ℹ".yellow());
        return Ok(());
    }

    let count = |state: PolicyState| policies.iter().filter(|p| p.state == state).count();
    println!(
        "\n{} {} CA policies found ({} enabled, {} report-only, {} disabled)\n",
        "→".cyan(),
        policies.len(),
        count(PolicyState::Enabled).to_string().green(),
        count(PolicyState::EnabledForReportingButNotEnforced)
            .to_string()
            .yellow(),
        count(PolicyState::Disabled).to_string().red()
    );

    println!(
        "{:<50} {:<15} {:<12}",
        "Name".bold(),
        "State".bold(),
        "Created".bold()
    );
    println!("{}", "─".repeat(80));

    for policy in policies
        .iter()
        .filter(|p| state_filter.map_or(true, |state| p.state == state))
    {
        println!(
            "{:<50} {:<15} {:<12}",
            truncate_name(&policy.display_name, 48),
            state_label(policy.state),
            date_part(policy.created_date_time.as_deref())
        );

        if args.detailed {
            println!("   ID: {}", policy.id.dimmed());
            println!(
                "   Modified: {}",
                date_part(policy.modified_date_time.as_deref()).dimmed()
            );
            println!();
        }
    }

    Ok(())
}

async fn show(conn: &Connection, args: PolicyArg) -> Result<()> {
    let id = resolve_policy_id(conn, &args.policy).await?;
    match conn.dispatch(Action::ShowPolicy { id }).await? {
        Outcome::Policy(policy) => {
            println!("{}", serde_json::to_string_pretty(&policy)?);
        }
        Outcome::TargetVanished { target, refreshed } => render_vanished(&target, &refreshed),
        _ => {}
    }
    Ok(())
}

async fn clone(conn: &Connection, args: CloneArgs) -> Result<()> {
    let id = resolve_policy_id(conn, &args.policy).await?;
    let outcome = progress::with_spinner(
        "Cloning policy...",
        "Policy cloned",
        conn.dispatch(Action::ClonePolicy { id, name: args.name }),
    )
    .await?;

    match outcome {
        Outcome::PolicyCreated(policy) => {
            prompts::success(&format!(
                "Created '{}' (ID: {}) in state {}",
                policy.display_name,
                policy.id,
                state_label(policy.state)
            ));
            prompts::info(&format!(
                "Review it, then run 'ca-admin policy enable {}' to enforce",
                policy.id
            ));
        }
        Outcome::TargetVanished { target, refreshed } => render_vanished(&target, &refreshed),
        _ => {}
    }
    Ok(())
}

async fn set_state(conn: &Connection, args: PolicyArg, state: PolicyState) -> Result<()> {
    let id = resolve_policy_id(conn, &args.policy).await?;
    match conn.dispatch(Action::SetPolicyState { id, state }).await? {
        Outcome::PolicyStateChanged { id, state } => {
            prompts::success(&format!("Policy {} is now {}", id, state_label(state)));
        }
        Outcome::TargetVanished { target, refreshed } => render_vanished(&target, &refreshed),
        _ => {}
    }
    Ok(())
}

async fn delete(conn: &Connection, args: DeleteArgs) -> Result<()> {
    let mut ids = Vec::with_capacity(args.policies.len());
    for key in &args.policies {
        ids.push(resolve_policy_id(conn, key).await?);
    }

    prompts::warning(&format!(
        "About to delete {} policy(ies): {}",
        ids.len(),
        ids.join(", ")
    ));
    if !prompts::confirm_unless(args.yes, "Delete these policies? This cannot be undone")? {
        prompts::info("Cancelled");
        return Ok(());
    }

    if let Outcome::PoliciesDeleted { deleted, vanished } =
        conn.dispatch(Action::DeletePolicies { ids }).await?
    {
        for id in &deleted {
            prompts::success(&format!("Deleted policy {}", id));
        }
        for id in &vanished {
            prompts::warning(&format!("Policy {} was already gone", id));
        }
    }
    Ok(())
}
