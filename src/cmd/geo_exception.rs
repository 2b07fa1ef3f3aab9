//! `geo-exception`: let named users sign in from a blocked country
//!
//! Creates a country location and a disabled copy of the blocking policy
//! scoped to those users, then excludes them from the original policy.

use crate::actions::{Action, Outcome};
use crate::cmd::{policy, prompts, render_vanished, split_values, users, Connection};
use crate::error::Result;
use crate::geo_exception::{GeoExceptionOutcome, GeoExceptionPlan, GeoExceptionRequest};
use crate::graph::GraphService;
use crate::location;
use crate::poll::cancel_pair;
use clap::Args;
use colored::Colorize;
use tracing::warn;

#[derive(Args, Debug)]
pub struct GeoExceptionArgs {
    /// Source policy (ID or display name)
    #[arg(long)]
    pub policy: String,

    /// Source country location referenced by the policy (ID or display name)
    #[arg(long)]
    pub location: String,

    /// Name for the new named location
    #[arg(long, short = 'n')]
    pub name: String,

    /// Comma-separated country codes for the new location
    #[arg(long, required = true)]
    pub countries: Vec<String>,

    /// Exception users (object ID, UPN or display name; repeatable or comma-separated)
    #[arg(long, short = 'u', required = true)]
    pub users: Vec<String>,

    /// Name for the exception policy (default: "<policy> - <name>")
    #[arg(long)]
    pub policy_name: Option<String>,

    /// Include unknown countries/regions in the new location
    #[arg(long, conflicts_with = "exclude_unknown")]
    pub include_unknown: bool,

    /// Exclude unknown countries/regions from the new location
    #[arg(long)]
    pub exclude_unknown: bool,

    /// Show what would be created without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl GeoExceptionArgs {
    fn include_unknown(&self) -> Option<bool> {
        match (self.include_unknown, self.exclude_unknown) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

pub async fn run(args: GeoExceptionArgs) -> Result<()> {
    let conn = Connection::open()?;
    conn.print_tenant();

    let request = build_request(&conn, &args).await?;
    // fail on bad input before touching anything
    request.validate()?;

    if !args.dry_run {
        prompts::section_header("Geo Exception");
        println!("  Source policy:   {}", request.source_policy_id);
        println!("  Source location: {}", request.source_location_id);
        println!("  New location:    {}", request.location_name.bold());
        println!("  Users:           {}", request.users.join(", "));
        println!();
        if !prompts::confirm_unless(args.yes, "Create the exception?")? {
            prompts::info("Cancelled");
            return Ok(());
        }
    }

    let (handle, signal) = cancel_pair();
    // dry runs never write, so Ctrl-C keeps its default meaning there
    let listener = (!args.dry_run).then(|| {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping geo exception");
                prompts::warning("Interrupted: stopping before the next step");
                handle.cancel();
            }
        })
    });

    let settings = conn.settings().with_cancel(signal);
    let action = Action::GeoException {
        request,
        dry_run: args.dry_run,
    };
    let result = crate::actions::dispatch(&conn.client, &settings, action).await;
    if let Some(listener) = listener {
        listener.abort();
    }

    // failures (including the list of completed steps) are rendered by main
    match result? {
        Outcome::GeoExceptionPlanned(plan) => render_plan(&plan),
        Outcome::GeoExceptionCreated(outcome) => render_outcome(&outcome),
        Outcome::TargetVanished { target, refreshed } => render_vanished(&target, &refreshed),
        _ => {}
    }
    Ok(())
}

/// Turns policy and location names into IDs; IDs pass through
async fn build_request(conn: &Connection, args: &GeoExceptionArgs) -> Result<GeoExceptionRequest> {
    let policies = conn.client.list_policies().await?;
    let source_policy_id = policy::find_policy(&policies, &args.policy)
        .map(|p| p.id.clone())
        .unwrap_or_else(|| args.policy.trim().to_string());

    let locations = conn.client.list_named_locations().await?;
    let source_location_id = location::find_location(&locations, &args.location)
        .map(|l| l.id().to_string())
        .unwrap_or_else(|| args.location.trim().to_string());

    Ok(GeoExceptionRequest {
        source_policy_id,
        source_location_id,
        location_name: args.name.trim().to_string(),
        countries: split_values(&args.countries),
        include_unknown: args.include_unknown(),
        users: split_values(&args.users),
        policy_name: args.policy_name.clone(),
    })
}

fn render_plan(plan: &GeoExceptionPlan) {
    prompts::section_header("Dry run: nothing was changed");

    println!("{}", "Named location to create:".bold());
    match serde_json::to_string_pretty(&plan.location) {
        Ok(json) => println!("{}", json),
        Err(e) => prompts::warning(&format!("Could not render location: {}", e)),
    }

    println!("\n{}", "Policy to create (disabled):".bold());
    match serde_json::to_string_pretty(&plan.policy_payload) {
        Ok(json) => println!("{}", json),
        Err(e) => prompts::warning(&format!("Could not render policy: {}", e)),
    }

    println!("\n{}", "Patch for the original policy:".bold());
    match serde_json::to_string_pretty(&plan.original_policy_patch) {
        Ok(json) => println!("{}", json),
        Err(e) => prompts::warning(&format!("Could not render patch: {}", e)),
    }

    users::render_resolution(&plan.resolution);
}

fn render_outcome(outcome: &GeoExceptionOutcome) {
    prompts::success(&format!(
        "Created named location '{}' ({})",
        outcome.location.display_name(),
        outcome.location.id()
    ));
    prompts::success(&format!(
        "Created policy '{}' ({}) in state {}",
        outcome.policy.display_name, outcome.policy.id, outcome.policy.state
    ));
    prompts::success(&format!(
        "Excluded {} user(s) from policy {}",
        outcome.resolution.resolved_ids.len(),
        outcome.original_policy_id
    ));
    if !outcome.resolution.is_complete() {
        prompts::warning(&format!(
            "Not resolved and left out: {}",
            outcome.resolution.unresolved.join(", ")
        ));
    }
    prompts::info(&format!(
        "Review the new policy, then run 'ca-admin policy enable {}'",
        outcome.policy.id
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(include: bool, exclude: bool) -> GeoExceptionArgs {
        GeoExceptionArgs {
            policy: "P1".into(),
            location: "L1".into(),
            name: "Travel".into(),
            countries: vec!["FR".into()],
            users: vec!["u1@contoso.com".into()],
            policy_name: None,
            include_unknown: include,
            exclude_unknown: exclude,
            dry_run: true,
            yes: true,
        }
    }

    #[test]
    fn test_unknown_country_flags() {
        assert_eq!(args(false, false).include_unknown(), None);
        assert_eq!(args(true, false).include_unknown(), Some(true));
        assert_eq!(args(false, true).include_unknown(), Some(false));
    }
}
