use crate::config::{AuthType, ConfigManager, TenantConfig};
use crate::error::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

#[derive(Subcommand, Debug)]
pub enum TenantCommands {
    /// Add a tenant configuration
    Add(TenantAddArgs),
    /// List configured tenants
    List(TenantListArgs),
    /// Switch the active tenant
    Switch(TenantSwitchArgs),
    /// Remove a tenant configuration and its cached token
    Remove(TenantRemoveArgs),
}

#[derive(Args, Debug)]
pub struct TenantAddArgs {
    /// Tenant name
    name: String,

    /// Tenant ID (Entra tenant ID)
    #[arg(long)]
    tenant_id: String,

    /// Client ID (application ID)
    #[arg(long)]
    client_id: String,

    /// Client secret (for client credentials flow)
    #[arg(long)]
    client_secret: Option<String>,

    /// Use client credentials flow
    #[arg(long)]
    client_credentials: bool,

    /// Tenant description
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
pub struct TenantListArgs {
    /// Show detailed information
    #[arg(short, long)]
    detailed: bool,
}

#[derive(Args, Debug)]
pub struct TenantSwitchArgs {
    /// Tenant name to switch to
    name: String,
}

#[derive(Args, Debug)]
pub struct TenantRemoveArgs {
    /// Tenant name to remove
    name: String,
}

pub async fn run(cmd: TenantCommands) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    match cmd {
        TenantCommands::Add(args) => add(&config_manager, args),
        TenantCommands::List(args) => list(&config_manager, args),
        TenantCommands::Switch(args) => switch(&config_manager, args),
        TenantCommands::Remove(args) => remove(&config_manager, args),
    }
}

fn add(config_manager: &ConfigManager, args: TenantAddArgs) -> Result<()> {
    let auth_type = if args.client_credentials || args.client_secret.is_some() {
        AuthType::ClientCredentials
    } else {
        AuthType::DeviceCode
    };

    let tenant = TenantConfig {
        name: args.name.clone(),
        tenant_id: args.tenant_id,
        client_id: args.client_id,
        client_secret: args.client_secret,
        auth_type,
        description: args.description,
    };

    config_manager.add_tenant(tenant)?;

    println!("{} Tenant '{}' added successfully", "✓".green(), args.name);
    println!(
        "\n{} Run {} to authenticate",
        "→".cyan(),
        format!("ca-admin login {}", args.name).bold()
    );

    Ok(())
}

fn list(config_manager: &ConfigManager, args: TenantListArgs) -> Result<()> {
    let tenants = config_manager.load_tenants()?;
    let config = config_manager.load_config()?;

    if tenants.is_empty() {
        println!("{} No tenants configured", "!".yellow());
        println!(
            "\n{} Run {} to add a tenant",
            "→".cyan(),
            "ca-admin tenant add".bold()
        );
        return Ok(());
    }

    println!("\n{}", "Configured Tenants:".bold());
    println!("{}", "─".repeat(60));

    for tenant in &tenants {
        let is_current = config
            .current_tenant
            .as_deref()
            .is_some_and(|current| current.eq_ignore_ascii_case(&tenant.name));
        let marker = if is_current {
            "●".green()
        } else {
            "○".dimmed()
        };

        println!("\n{} {}", marker, tenant.name.bold());

        if args.detailed {
            println!("  Tenant ID:    {}", tenant.tenant_id);
            println!("  Client ID:    {}", tenant.client_id);
            println!("  Auth Type:    {:?}", tenant.auth_type);

            if let Some(desc) = &tenant.description {
                println!("  Description:  {}", desc);
            }

            match config_manager.load_token(&tenant.name) {
                Ok(token) => println!(
                    "  Status:       {} (expires: {})",
                    "Authenticated".green(),
                    token.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                Err(_) => println!("  Status:       {}", "Not authenticated".yellow()),
            }
        }
    }

    println!("\n{}", "─".repeat(60));
    println!("{} {} tenant(s) total", "→".cyan(), tenants.len());

    if let Some(current) = &config.current_tenant {
        println!("{} Active: {}", "→".cyan(), current.bold());
    }

    Ok(())
}

fn switch(config_manager: &ConfigManager, args: TenantSwitchArgs) -> Result<()> {
    config_manager.set_active_tenant(&args.name)?;
    println!("{} Switched to tenant '{}'", "✓".green(), args.name);
    Ok(())
}

fn remove(config_manager: &ConfigManager, args: TenantRemoveArgs) -> Result<()> {
    config_manager.remove_tenant(&args.name)?;
    println!("{} Tenant '{}' removed", "✓".green(), args.name);
    Ok(())
}
