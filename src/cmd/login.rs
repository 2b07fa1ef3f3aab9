use crate::config::{AuthType, ConfigManager, TenantConfig};
use crate::error::{CaError, Result};
use crate::graph::auth::GraphAuth;
use clap::Args;
use colored::Colorize;

/// Safely truncate a string to n characters (not bytes) to prevent panics on non-ASCII
fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Name of a configured tenant
    #[arg(index = 1)]
    name: Option<String>,

    /// Tenant ID (Entra tenant ID) for quick setup
    #[arg(long)]
    tenant_id: Option<String>,

    /// Client ID (application ID) for quick setup
    #[arg(long)]
    client_id: Option<String>,

    /// Client secret (for client credentials flow)
    #[arg(long)]
    client_secret: Option<String>,

    /// Use client credentials flow instead of device code
    #[arg(long)]
    client_credentials: bool,

    /// Tenant description
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Tenant name (defaults to the active tenant)
    #[arg(short, long)]
    tenant: Option<String>,

    /// Logout from all tenants
    #[arg(long)]
    all: bool,
}

fn quick_setup_tenant(args: &LoginArgs, tenant_id: &str, client_id: &str) -> TenantConfig {
    let name = args.name.clone().unwrap_or_else(|| {
        // friendly name from the first GUID segment
        tenant_id
            .split('-')
            .next()
            .unwrap_or("my-tenant")
            .to_string()
    });

    let auth_type = if args.client_credentials || args.client_secret.is_some() {
        AuthType::ClientCredentials
    } else {
        AuthType::DeviceCode
    };

    TenantConfig {
        name,
        tenant_id: tenant_id.to_string(),
        client_id: client_id.to_string(),
        client_secret: args.client_secret.clone(),
        auth_type,
        description: args.description.clone(),
    }
}

pub async fn login(args: LoginArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;

    let tenant_config = if let (Some(tenant_id), Some(client_id)) = (&args.tenant_id, &args.client_id)
    {
        println!(
            "\n{} Quick setup mode: creating tenant configuration...",
            "→".cyan()
        );
        let tenant = quick_setup_tenant(&args, tenant_id, client_id);
        config_manager.add_tenant(tenant.clone())?;
        println!("{} Tenant '{}' configuration saved", "✓".green(), tenant.name);
        tenant
    } else if let Some(name) = &args.name {
        let tenant = config_manager.get_tenant(name)?;
        println!(
            "{} Loaded tenant: {} ({})",
            "✓".green(),
            tenant.name.bold(),
            tenant.description.as_deref().unwrap_or("")
        );
        println!("  Tenant ID: {}...", truncate_chars(&tenant.tenant_id, 8));
        println!("  Client ID: {}...", truncate_chars(&tenant.client_id, 8));
        tenant
    } else if let Some(active) = config_manager.get_active_tenant()? {
        active
    } else {
        return Err(CaError::InvalidConfig(
            "Usage:\n  \
            ca-admin login NAME                            # Use existing tenant config\n  \
            ca-admin login --tenant-id ID --client-id ID   # Quick setup"
                .into(),
        ));
    };

    let auth = GraphAuth::new(config_manager.clone());
    let session = auth.connect(&tenant_config).await?;
    config_manager.set_active_tenant(&tenant_config.name)?;

    println!(
        "\n{} Authenticated to {} (token valid until {})",
        "✓".green().bold(),
        session.tenant_id(),
        session.expires_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "{} Active tenant: {}",
        "→".cyan(),
        tenant_config.name.bold()
    );
    Ok(())
}

pub async fn logout(args: LogoutArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let auth = GraphAuth::new(config_manager.clone());

    if args.all {
        let tenants = config_manager.load_tenants()?;
        for tenant in &tenants {
            auth.disconnect(&tenant.name)?;
        }
        println!("{} Logged out from all tenants", "✓".green());
        return Ok(());
    }

    let tenant_name = match args.tenant {
        Some(name) => name,
        None => match config_manager.load_config()?.current_tenant {
            Some(current) => current,
            None => {
                println!("{} No active tenant", "!".yellow());
                return Ok(());
            }
        },
    };

    auth.disconnect(&tenant_name)?;
    println!("{} Logged out from '{}'", "✓".green(), tenant_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("äöü-1234", 3), "äöü");
        assert_eq!(truncate_chars("ab", 8), "ab");
    }

    #[test]
    fn test_quick_setup_picks_flow_and_name() {
        let args = LoginArgs {
            name: None,
            tenant_id: Some("0b7c1f1e-aaaa-bbbb-cccc-123456789abc".into()),
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
            client_credentials: false,
            description: None,
        };

        let tenant = quick_setup_tenant(&args, "0b7c1f1e-aaaa-bbbb-cccc-123456789abc", "client");
        assert_eq!(tenant.name, "0b7c1f1e");
        assert_eq!(tenant.auth_type, AuthType::ClientCredentials);
    }
}
