use crate::error::{CaError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub log_level: String,

    #[serde(default)]
    pub current_tenant: Option<String>,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub geo_exception: GeoExceptionSettings,
}

/// Transport retry tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

/// How long to wait for a freshly created location to become readable
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoExceptionSettings {
    pub verify_attempts: u32,
    pub verify_delay_secs: u64,
}

impl Default for GeoExceptionSettings {
    fn default() -> Self {
        Self {
            verify_attempts: 10,
            verify_delay_secs: 3,
        }
    }
}

impl GeoExceptionSettings {
    pub fn verify_delay(&self) -> Duration {
        Duration::from_secs(self.verify_delay_secs)
    }
}

/// Tenant-specific configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TenantConfig {
    pub name: String,
    pub tenant_id: String,
    pub client_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub auth_type: AuthType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    DeviceCode,
    ClientCredentials,
}

/// Token cache structure
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub tenant_id: String,
}

/// Configuration manager
#[derive(Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "ca-admin", "ca-admin").ok_or_else(|| {
            CaError::ConfigError("Failed to determine config directory".into())
        })?;

        Self::with_dir(project_dirs.config_dir().to_path_buf())
    }

    /// Use an explicit directory instead of the platform default
    pub fn with_dir(config_dir: PathBuf) -> Result<Self> {
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }

        Ok(Self { config_dir })
    }

    pub fn load() -> Result<Self> {
        Self::new()
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn tenants_file(&self) -> PathBuf {
        self.config_dir.join("tenants.toml")
    }

    pub fn token_cache_file(&self, tenant_name: &str) -> PathBuf {
        self.config_dir
            .join("cache")
            .join(format!("{}.token", tenant_name))
    }

    pub fn load_config(&self) -> Result<Config> {
        let config_path = self.config_file();

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        let contents = toml::to_string_pretty(config)
            .map_err(|e| CaError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    pub fn load_tenants(&self) -> Result<Vec<TenantConfig>> {
        let tenants_path = self.tenants_file();

        if !tenants_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(tenants_path)?;

        #[derive(Deserialize)]
        struct TenantsFile {
            #[serde(default)]
            tenants: Vec<TenantConfig>,
        }

        let file: TenantsFile = toml::from_str(&contents)?;
        Ok(file.tenants)
    }

    pub fn save_tenants(&self, tenants: &[TenantConfig]) -> Result<()> {
        #[derive(Serialize)]
        struct TenantsFile<'a> {
            tenants: &'a [TenantConfig],
        }

        let contents = toml::to_string_pretty(&TenantsFile { tenants })
            .map_err(|e| CaError::ConfigError(format!("Failed to serialize tenants: {}", e)))?;
        fs::write(self.tenants_file(), contents)?;
        Ok(())
    }

    /// Add or replace a tenant (matched by name)
    pub fn add_tenant(&self, tenant: TenantConfig) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        tenants.retain(|t| t.name != tenant.name);
        tenants.push(tenant);
        self.save_tenants(&tenants)
    }

    pub fn get_tenant(&self, name: &str) -> Result<TenantConfig> {
        self.load_tenants()?
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CaError::TenantNotFound(name.to_string()))
    }

    pub fn get_active_tenant(&self) -> Result<Option<TenantConfig>> {
        match self.load_config()?.current_tenant {
            Some(tenant_name) => Ok(Some(self.get_tenant(&tenant_name)?)),
            None => Ok(None),
        }
    }

    /// Active tenant, or a config error telling the operator what to run
    pub fn require_active_tenant(&self) -> Result<TenantConfig> {
        self.get_active_tenant()?.ok_or_else(|| {
            CaError::ConfigError(
                "No active tenant. Run 'ca-admin tenant add' and 'ca-admin login' first.".into(),
            )
        })
    }

    pub fn set_active_tenant(&self, tenant_name: &str) -> Result<()> {
        let tenant = self.get_tenant(tenant_name)?;

        let mut config = self.load_config()?;
        config.current_tenant = Some(tenant.name);
        self.save_config(&config)
    }

    /// Remove a tenant, its cached token, and clear it as active tenant
    pub fn remove_tenant(&self, tenant_name: &str) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        let original_len = tenants.len();
        tenants.retain(|t| !t.name.eq_ignore_ascii_case(tenant_name));

        if tenants.len() == original_len {
            return Err(CaError::TenantNotFound(tenant_name.to_string()));
        }

        self.save_tenants(&tenants)?;
        let _ = self.delete_token(tenant_name);

        let mut config = self.load_config()?;
        if config
            .current_tenant
            .as_deref()
            .is_some_and(|current| current.eq_ignore_ascii_case(tenant_name))
        {
            config.current_tenant = None;
            self.save_config(&config)?;
        }

        Ok(())
    }

    pub fn save_token(&self, tenant_name: &str, token: &TokenCache) -> Result<()> {
        let cache_dir = self.config_dir.join("cache");
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }

        let contents = serde_json::to_string_pretty(token)?;
        fs::write(self.token_cache_file(tenant_name), contents)?;
        Ok(())
    }

    /// Load a cached token; an expired token is reported as an auth error
    pub fn load_token(&self, tenant_name: &str) -> Result<TokenCache> {
        let token_path = self.token_cache_file(tenant_name);

        if !token_path.exists() {
            return Err(CaError::TokenNotFound);
        }

        let contents = fs::read_to_string(token_path)?;
        let token: TokenCache = serde_json::from_str(&contents)?;

        if token.expires_at < chrono::Utc::now() {
            return Err(CaError::AuthError("Token expired".into()));
        }

        Ok(token)
    }

    pub fn delete_token(&self, tenant_name: &str) -> Result<()> {
        let token_path = self.token_cache_file(tenant_name);

        if token_path.exists() {
            fs::remove_file(token_path)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, ConfigManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path().join("ca-admin")).unwrap();
        (dir, manager)
    }

    fn tenant(name: &str) -> TenantConfig {
        TenantConfig {
            name: name.to_string(),
            tenant_id: "11111111-2222-3333-4444-555555555555".to_string(),
            client_id: "66666666-7777-8888-9999-000000000000".to_string(),
            client_secret: None,
            auth_type: AuthType::DeviceCode,
            description: None,
        }
    }

    #[test]
    fn test_defaults_when_no_config_file() {
        let (_dir, manager) = manager();
        let config = manager.load_config().unwrap();
        assert!(config.current_tenant.is_none());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.geo_exception.verify_attempts, 10);
        assert_eq!(config.geo_exception.verify_delay(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let (_dir, manager) = manager();
        fs::write(
            manager.config_file(),
            "current_tenant = \"contoso\"\n\n[geo_exception]\nverify_attempts = 4\nverify_delay_secs = 1\n",
        )
        .unwrap();

        let config = manager.load_config().unwrap();
        assert_eq!(config.current_tenant.as_deref(), Some("contoso"));
        assert_eq!(config.geo_exception.verify_attempts, 4);
        assert_eq!(config.retry.initial_backoff_ms, 1000);
    }

    #[test]
    fn test_add_switch_and_remove_tenant() {
        let (_dir, manager) = manager();
        manager.add_tenant(tenant("contoso")).unwrap();
        manager.add_tenant(tenant("fabrikam")).unwrap();
        manager.set_active_tenant("contoso").unwrap();

        assert_eq!(manager.require_active_tenant().unwrap().name, "contoso");

        manager.remove_tenant("contoso").unwrap();
        assert!(manager.get_active_tenant().unwrap().is_none());
        assert_eq!(manager.load_tenants().unwrap().len(), 1);
        assert!(matches!(
            manager.remove_tenant("contoso"),
            Err(CaError::TenantNotFound(_))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let (_dir, manager) = manager();
        let token = TokenCache {
            access_token: "abc".into(),
            refresh_token: None,
            expires_at: chrono::Utc::now() - chrono::Duration::minutes(5),
            tenant_id: "t".into(),
        };
        manager.save_token("contoso", &token).unwrap();

        assert!(matches!(
            manager.load_token("contoso"),
            Err(CaError::AuthError(_))
        ));
        assert!(matches!(
            manager.load_token("fabrikam"),
            Err(CaError::TokenNotFound)
        ));
    }
}
