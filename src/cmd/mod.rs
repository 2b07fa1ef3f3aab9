pub mod geo_exception;
pub mod location;
pub mod login;
pub mod policy;
pub mod progress;
pub mod prompts;
pub mod tenant;
pub mod users;

use crate::actions::{self, Action, DispatchSettings, Outcome, Refreshed};
use crate::config::{Config, ConfigManager};
use crate::error::{CaError, Result};
use crate::graph::auth::GraphAuth;
use crate::graph::GraphClient;
use colored::Colorize;

/// Everything a command needs to talk to the active tenant
pub struct Connection {
    pub tenant: String,
    pub config: Config,
    pub client: GraphClient,
}

impl Connection {
    /// Loads config and the active tenant's cached session
    pub fn open() -> Result<Self> {
        let config_manager = ConfigManager::new()?;
        let config = config_manager.load_config()?;
        let tenant = config_manager.require_active_tenant()?;

        let session = GraphAuth::new(config_manager)
            .current_session(&tenant.name)?
            .ok_or_else(|| {
                CaError::AuthError(format!(
                    "No valid session for tenant '{}'. Run 'ca-admin login {}' first.",
                    tenant.name, tenant.name
                ))
            })?;

        let client = GraphClient::from_session(&session, &config.retry);
        Ok(Self {
            tenant: tenant.name,
            config,
            client,
        })
    }

    pub fn settings(&self) -> DispatchSettings {
        DispatchSettings::from_config(&self.config)
    }

    pub async fn dispatch(&self, action: Action) -> Result<Outcome> {
        actions::dispatch(&self.client, &self.settings(), action).await
    }

    pub fn print_tenant(&self) {
        println!("→ Tenant: {}", self.tenant.cyan());
    }
}

/// Shared rendering for the "target vanished" outcome
pub fn render_vanished(target: &str, refreshed: &Refreshed) {
    println!(
        "{} The {} no longer exists (another admin may have removed it).",
        "!".yellow().bold(),
        target
    );
    match refreshed {
        Refreshed::Policies(policies) => {
            println!("  Current policies:");
            for policy in policies {
                println!("    {} {} ({})", "•".cyan(), policy.display_name, policy.id.dimmed());
            }
        }
        Refreshed::Locations(listing) => {
            println!("  Current named locations:");
            for location in &listing.locations {
                println!(
                    "    {} {} ({})",
                    "•".cyan(),
                    location.display_name(),
                    location.id().dimmed()
                );
            }
        }
    }
}

/// Values from repeated and/or comma-separated flags
pub fn split_values(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_values_accepts_both_styles() {
        let values = vec!["US, gb".to_string(), "FR".to_string(), " ".to_string()];
        assert_eq!(split_values(&values), vec!["US", "gb", "FR"]);
    }
}
