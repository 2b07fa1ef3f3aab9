use ca_admin::cmd;
use ca_admin::config::ConfigManager;
use ca_admin::error;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "ca-admin",
    about = "Manage Entra Conditional Access policies and named locations",
    version,
    long_about = "Manage Entra Conditional Access policies and named locations via Microsoft Graph\n\n\
                  List, clone and toggle policies, maintain named locations, and carve\n\
                  per-user geo exceptions out of country-blocking policies."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authenticate to Microsoft Graph API
    Login(cmd::login::LoginArgs),

    /// Logout and clear cached credentials
    Logout(cmd::login::LogoutArgs),

    /// Manage tenant configurations
    #[command(subcommand)]
    Tenant(cmd::tenant::TenantCommands),

    /// Manage Conditional Access policies
    #[command(subcommand)]
    Policy(cmd::policy::PolicyCommands),

    /// Manage named locations
    #[command(subcommand)]
    Location(cmd::location::LocationCommands),

    /// Look up directory users
    #[command(subcommand)]
    Users(cmd::users::UsersCommands),

    /// Exempt users from a country-based policy via a new location and policy
    GeoException(cmd::geo_exception::GeoExceptionArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// `--verbose` wins, then RUST_LOG, then the configured level
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ca_admin=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = ConfigManager::new()
                .and_then(|m| m.load_config())
                .map(|c| c.log_level)
                .unwrap_or_default();
            let level = if level.trim().is_empty() { "warn" } else { level.trim() };
            EnvFilter::new(format!("ca_admin={}", level))
        })
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> error::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Login(args) => cmd::login::login(args).await?,
        Commands::Logout(args) => cmd::login::logout(args).await?,
        Commands::Tenant(tenant_cmd) => cmd::tenant::run(tenant_cmd).await?,
        Commands::Policy(policy_cmd) => cmd::policy::run(policy_cmd).await?,
        Commands::Location(location_cmd) => cmd::location::run(location_cmd).await?,
        Commands::Users(users_cmd) => cmd::users::run(users_cmd).await?,
        Commands::GeoException(args) => cmd::geo_exception::run(args).await?,
    }

    Ok(())
}
