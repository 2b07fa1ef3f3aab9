use crate::config::{AuthType, ConfigManager, TenantConfig, TokenCache};
use crate::error::{CaError, Result};
use chrono::{DateTime, Utc};
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, ClientId, ClientSecret,
    DeviceAuthorizationUrl, EmptyExtraDeviceAuthorizationFields, Scope, TokenResponse, TokenUrl,
};
use std::time::Duration;

const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Graph permissions the app registration needs (consented through `.default`)
pub const REQUIRED_SCOPES: &[&str] = &[
    "Policy.Read.All",
    "Policy.ReadWrite.ConditionalAccess",
    "User.Read.All",
];

/// An authenticated connection to one tenant
#[derive(Debug, Clone)]
pub struct Session {
    tenant_name: String,
    tenant_id: String,
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn from_cache(tenant_name: &str, token: TokenCache) -> Self {
        Self {
            tenant_name: tenant_name.to_string(),
            tenant_id: token.tenant_id,
            access_token: token.access_token,
            expires_at: token.expires_at,
        }
    }

    pub fn tenant_name(&self) -> &str {
        &self.tenant_name
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && self.expires_at > Utc::now()
    }
}

pub struct GraphAuth {
    config_manager: ConfigManager,
}

impl GraphAuth {
    pub fn new(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    /// Authenticate with the tenant's configured flow and cache the token
    pub async fn connect(&self, tenant_config: &TenantConfig) -> Result<Session> {
        let token = match tenant_config.auth_type {
            AuthType::DeviceCode => self.login_device_code(tenant_config).await?,
            AuthType::ClientCredentials => self.login_client_credentials(tenant_config).await?,
        };

        self.config_manager
            .save_token(&tenant_config.name, &token)?;
        tracing::info!(tenant = %tenant_config.name, "session established");

        Ok(Session::from_cache(&tenant_config.name, token))
    }

    /// Drop the cached token for a tenant
    pub fn disconnect(&self, tenant_name: &str) -> Result<()> {
        self.config_manager.delete_token(tenant_name)?;
        tracing::info!(tenant = %tenant_name, "session removed");
        Ok(())
    }

    /// Cached session for the tenant, if one exists and has not expired
    pub fn current_session(&self, tenant_name: &str) -> Result<Option<Session>> {
        match self.config_manager.load_token(tenant_name) {
            Ok(token) => Ok(Some(Session::from_cache(tenant_name, token))),
            Err(CaError::TokenNotFound) | Err(CaError::AuthError(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Like `current_session`, but a missing session is an error
    pub fn require_session(&self, tenant_name: &str) -> Result<Session> {
        self.current_session(tenant_name)?
            .ok_or(CaError::TokenNotFound)
    }

    fn endpoints(tenant_id: &str) -> Result<(AuthUrl, TokenUrl)> {
        let auth_url = AuthUrl::new(format!(
            "{}/{}/oauth2/v2.0/authorize",
            MICROSOFT_AUTHORITY, tenant_id
        ))
        .map_err(|e| CaError::AuthError(format!("Invalid auth URL: {}", e)))?;

        let token_url = TokenUrl::new(format!(
            "{}/{}/oauth2/v2.0/token",
            MICROSOFT_AUTHORITY, tenant_id
        ))
        .map_err(|e| CaError::AuthError(format!("Invalid token URL: {}", e)))?;

        Ok((auth_url, token_url))
    }

    fn expiry(expires_in: Option<Duration>) -> DateTime<Utc> {
        let lifetime = expires_in.unwrap_or(Duration::from_secs(3600));
        Utc::now() + chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::hours(1))
    }

    /// Device code flow (interactive)
    async fn login_device_code(&self, tenant_config: &TenantConfig) -> Result<TokenCache> {
        println!(
            "Starting device code authentication for tenant '{}'...",
            tenant_config.name
        );

        let tenant_id = &tenant_config.tenant_id;
        let (auth_url, token_url) = Self::endpoints(tenant_id)?;

        let device_auth_url = DeviceAuthorizationUrl::new(format!(
            "{}/{}/oauth2/v2.0/devicecode",
            MICROSOFT_AUTHORITY, tenant_id
        ))
        .map_err(|e| CaError::AuthError(format!("Invalid device auth URL: {}", e)))?;

        let client = BasicClient::new(
            ClientId::new(tenant_config.client_id.clone()),
            None,
            auth_url,
            Some(token_url),
        )
        .set_device_authorization_url(device_auth_url);

        let details: oauth2::DeviceAuthorizationResponse<EmptyExtraDeviceAuthorizationFields> =
            client
                .exchange_device_code()
                .map_err(|e| CaError::AuthError(format!("Device code exchange failed: {}", e)))?
                .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
                .request_async(async_http_client)
                .await
                .map_err(|e| {
                    CaError::AuthError(format!("Device authorization request failed: {}", e))
                })?;

        println!("\nPlease visit: {}", details.verification_uri().as_str());
        println!("Enter code: {}\n", details.user_code().secret());

        let token = client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await
            .map_err(|e| CaError::AuthError(format!("Token exchange failed: {}", e)))?;

        Ok(TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expires_at: Self::expiry(token.expires_in()),
            tenant_id: tenant_id.clone(),
        })
    }

    /// Client credentials flow (non-interactive)
    async fn login_client_credentials(&self, tenant_config: &TenantConfig) -> Result<TokenCache> {
        let client_secret = tenant_config.client_secret.as_ref().ok_or_else(|| {
            CaError::AuthError("Client secret required for client credentials flow".into())
        })?;

        let tenant_id = &tenant_config.tenant_id;
        let (auth_url, token_url) = Self::endpoints(tenant_id)?;

        let client = BasicClient::new(
            ClientId::new(tenant_config.client_id.clone()),
            Some(ClientSecret::new(client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        let token = client
            .exchange_client_credentials()
            .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| CaError::AuthError(format!("Client credentials exchange failed: {}", e)))?;

        Ok(TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: None,
            expires_at: Self::expiry(token.expires_in()),
            tenant_id: tenant_id.clone(),
        })
    }
}
