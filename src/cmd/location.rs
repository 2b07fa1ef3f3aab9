//! Named Location management for Conditional Access
//!
//! Commands for managing Named Locations (IP ranges, countries) used in CA policies.

use crate::actions::{Action, LocationListing, Outcome};
use crate::cmd::{progress, prompts, render_vanished, split_values, Connection};
use crate::error::{CaError, Result};
use crate::graph::conditional_access::NamedLocation;
use crate::location;
use clap::{Args, Subcommand};
use colored::Colorize;

#[derive(Subcommand, Debug)]
pub enum LocationCommands {
    /// Add a new named location (IP ranges or countries)
    Add(AddArgs),

    /// List all named locations and the policies using them
    List(ListArgs),

    /// Rename a location or change its trusted status
    Update(UpdateArgs),

    /// Remove named locations that no policy references
    Remove(RemoveArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Display name for the location
    #[arg(long, short = 'n')]
    pub name: String,

    /// IP address or CIDR range (repeatable or comma-separated)
    #[arg(long, conflicts_with = "countries")]
    pub ip: Vec<String>,

    /// Comma-separated country codes (e.g., US,CA,GB)
    #[arg(long, conflicts_with = "ip")]
    pub countries: Option<String>,

    /// Mark IP location as trusted
    #[arg(long)]
    pub trusted: bool,

    /// Include unknown countries/regions (for country locations)
    #[arg(long)]
    pub include_unknown: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show IDs, countries and ranges
    #[arg(long, short = 'd')]
    pub detailed: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// ID or name of the location to update
    pub location: String,

    /// Set trusted status (IP locations only)
    #[arg(long)]
    pub trusted: Option<bool>,

    /// New display name
    #[arg(long)]
    pub new_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// IDs or names of the locations to remove
    #[arg(required = true)]
    pub locations: Vec<String>,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub async fn run(cmd: LocationCommands) -> Result<()> {
    let conn = Connection::open()?;
    conn.print_tenant();

    match cmd {
        LocationCommands::Add(args) => add(&conn, args).await,
        LocationCommands::List(args) => list(&conn, args).await,
        LocationCommands::Update(args) => update(&conn, args).await,
        LocationCommands::Remove(args) => remove(&conn, args).await,
    }
}

/// Location built from the add flags, validated locally
fn build_location(args: &AddArgs) -> Result<NamedLocation> {
    let ranges = split_values(&args.ip);
    match (&args.countries, ranges.is_empty()) {
        (Some(countries), _) => location::new_country_location(
            &args.name,
            location::validate::split_country_list(countries).as_slice(),
            args.include_unknown,
        ),
        (None, false) => location::new_ip_location(&args.name, ranges.as_slice(), args.trusted),
        (None, true) => Err(CaError::Validation(
            "Must specify either --ip or --countries".into(),
        )),
    }
}

async fn add(conn: &Connection, args: AddArgs) -> Result<()> {
    let location = build_location(&args)?;

    let outcome = progress::with_spinner(
        "Creating named location...",
        "Named location created",
        conn.dispatch(Action::CreateLocation { location }),
    )
    .await?;

    if let Outcome::LocationCreated(created) = outcome {
        prompts::success(&format!(
            "Created {} location '{}' (ID: {})",
            created.kind(),
            created.display_name().green(),
            created.id()
        ));
        if let NamedLocation::Ip(ip) = &created {
            if ip.is_trusted {
                println!("  {} Marked as trusted location", "→".cyan());
            }
        }
    }
    Ok(())
}

fn render_listing(listing: &LocationListing, detailed: bool) {
    if listing.locations.is_empty() {
        println!("{}", "No named locations found.".dimmed());
        return;
    }

    println!("{}", "Named Locations:".bold());
    println!("{}", "─".repeat(60));

    for loc in &listing.locations {
        let (kind, trusted) = match loc {
            NamedLocation::Country(_) => ("Country".yellow(), String::new()),
            NamedLocation::Ip(ip) if ip.is_trusted => {
                ("IP".cyan(), " [Trusted]".green().to_string())
            }
            NamedLocation::Ip(_) => ("IP".cyan(), String::new()),
        };

        println!(
            "  {} {} ({}){}",
            "•".cyan(),
            loc.display_name().bold(),
            kind,
            trusted
        );

        let used_by = listing.index.referenced_by(loc.id());
        if used_by.is_empty() {
            println!("    Used by: {}", "nothing".dimmed());
        } else {
            println!("    Used by: {}", used_by);
        }

        if detailed {
            println!("    ID: {}", loc.id().dimmed());
            match loc {
                NamedLocation::Country(country) => {
                    println!(
                        "    Countries: {}",
                        country.countries_and_regions.join(", ").dimmed()
                    );
                    if country.include_unknown_countries_and_regions {
                        println!("    Includes unknown countries/regions");
                    }
                }
                NamedLocation::Ip(ip) => {
                    for range in &ip.ip_ranges {
                        println!("    IP Range: {}", range.cidr().dimmed());
                    }
                }
            }
            println!();
        }
    }

    println!("{}", "─".repeat(60));
    println!("Total: {} named locations", listing.locations.len());
}

async fn list(conn: &Connection, args: ListArgs) -> Result<()> {
    let outcome = progress::with_spinner(
        "Fetching named locations...",
        "Fetched named locations",
        conn.dispatch(Action::ListLocations),
    )
    .await?;

    if let Outcome::Locations(listing) = outcome {
        println!();
        render_listing(&listing, args.detailed);
    }
    Ok(())
}

/// Maps ID-or-name keys to location IDs; unknown keys pass through so the
/// deletion plan reports them
fn resolve_location_ids(listing: &LocationListing, keys: &[String]) -> Vec<String> {
    keys.iter()
        .map(|key| {
            location::find_location(&listing.locations, key)
                .map(|loc| loc.id().to_string())
                .unwrap_or_else(|| key.trim().to_string())
        })
        .collect()
}

async fn update(conn: &Connection, args: UpdateArgs) -> Result<()> {
    if args.trusted.is_none() && args.new_name.is_none() {
        prompts::warning("No changes specified. Use --trusted or --new-name");
        return Ok(());
    }

    let listing = crate::actions::list_locations(&conn.client).await?;
    let id = resolve_location_ids(&listing, std::slice::from_ref(&args.location))
        .pop()
        .unwrap_or_default();

    let mut actions = Vec::new();
    if let Some(name) = args.new_name {
        actions.push(Action::RenameLocation { id: id.clone(), name });
    }
    if let Some(trusted) = args.trusted {
        actions.push(Action::SetLocationTrusted { id, trusted });
    }

    for action in actions {
        match conn.dispatch(action).await? {
            Outcome::LocationUpdated { id, change } => {
                prompts::success(&format!("Updated named location {} ({})", id, change));
            }
            Outcome::TargetVanished { target, refreshed } => {
                render_vanished(&target, &refreshed);
                break;
            }
            _ => {}
        }
    }
    Ok(())
}

async fn remove(conn: &Connection, args: RemoveArgs) -> Result<()> {
    let listing = crate::actions::list_locations(&conn.client).await?;
    let ids = resolve_location_ids(&listing, &args.locations);

    let plan = location::plan_location_deletion(&listing.index, &ids);
    if plan.deletable.is_empty() {
        for skipped in &plan.skipped {
            prompts::warning(&format!("Skipping {}: {}", skipped.location_id, skipped.reason));
        }
        prompts::info("Nothing to delete");
        return Ok(());
    }

    prompts::warning(&format!(
        "About to delete {} named location(s): {}",
        plan.deletable.len(),
        plan.deletable.join(", ")
    ));
    if !prompts::confirm_unless(args.yes, "Delete? This cannot be undone")? {
        prompts::info("Cancelled");
        return Ok(());
    }

    if let Outcome::LocationsDeleted {
        deleted,
        vanished,
        skipped,
    } = conn.dispatch(Action::DeleteLocations { ids }).await?
    {
        for id in &deleted {
            prompts::success(&format!("Deleted named location {}", id));
        }
        for id in &vanished {
            prompts::warning(&format!("Named location {} was already gone", id));
        }
        for skip in &skipped {
            let name = skip.location_name.as_deref().unwrap_or(&skip.location_id);
            prompts::warning(&format!("Skipped '{}': {}", name, skip.reason));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_args(ip: &[&str], countries: Option<&str>) -> AddArgs {
        AddArgs {
            name: "Office".into(),
            ip: ip.iter().map(|s| s.to_string()).collect(),
            countries: countries.map(String::from),
            trusted: true,
            include_unknown: false,
        }
    }

    #[test]
    fn test_build_location_requires_a_kind() {
        assert!(matches!(
            build_location(&add_args(&[], None)),
            Err(CaError::Validation(_))
        ));
    }

    #[test]
    fn test_build_ip_location_from_comma_list() {
        let location = build_location(&add_args(&["10.0.0.1, 10.0.1.0/24"], None)).unwrap();
        match location {
            NamedLocation::Ip(ip) => {
                assert_eq!(ip.ip_ranges.len(), 2);
                assert_eq!(ip.ip_ranges[0].cidr(), "10.0.0.1/32");
            }
            other => panic!("expected IP location, got {:?}", other),
        }
    }

    #[test]
    fn test_build_country_location_validates_codes() {
        assert!(build_location(&add_args(&[], Some("us,gb"))).is_ok());
        assert!(build_location(&add_args(&[], Some("USA"))).is_err());
    }
}
