use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Graph API error: {0}")]
    GraphApiError(String),

    /// The target resource does not exist (any more)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local input rejected before any network call
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Gave up waiting for {what} after {attempts} attempts")]
    ConditionTimeout { what: String, attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    /// A geo exception run stopped part way through. Nothing is rolled back.
    #[error(
        "Geo exception failed during '{step}': {source}\n  Completed before failure (not rolled back): {}",
        describe_completed(.completed)
    )]
    GeoExceptionFailed {
        step: String,
        completed: Vec<String>,
        #[source]
        source: Box<CaError>,
    },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Interactive prompt error: {0}")]
    DialoguerError(#[from] dialoguer::Error),

    #[error("Token not found. Please run 'ca-admin login' first")]
    TokenNotFound,

    #[error("Tenant '{0}' not found")]
    TenantNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CaError>;

pub use CaError as Error;

impl CaError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CaError::NotFound(_))
    }
}

fn describe_completed(completed: &[String]) -> String {
    if completed.is_empty() {
        "nothing".to_string()
    } else {
        completed.join("; ")
    }
}

/// Parse Graph API error response and provide helpful context
pub fn enhance_graph_error(error_response: &str) -> String {
    if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_response) {
        if let Some(error_obj) = error_json.get("error") {
            let code = error_obj
                .get("code")
                .and_then(|c| c.as_str())
                .unwrap_or("Unknown");
            let message = error_obj
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("No message");

            let hint = match code {
                "Unauthorized" | "InvalidAuthenticationToken" => {
                    "\nHint: your token may have expired. Run 'ca-admin login' again."
                }
                "Forbidden" | "InsufficientPrivileges" | "Authorization_RequestDenied" => {
                    "\nHint: the app registration needs Policy.ReadWrite.ConditionalAccess, Policy.Read.All and User.Read.All with admin consent."
                }
                "BadRequest" => {
                    if message.contains("already exists") {
                        "\nHint: an object with this name already exists. Pick a different name."
                    } else {
                        "\nHint: the request body was rejected. Check the policy or location structure."
                    }
                }
                "NotFound" | "Request_ResourceNotFound" => {
                    "\nHint: the object no longer exists. Refresh the list and try again."
                }
                "TooManyRequests" => "\nHint: API rate limit exceeded. Wait a moment and try again.",
                _ => "",
            };

            return format!("{}: {}{}", code, message, hint);
        }
    }

    error_response.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhance_graph_error_extracts_code_and_message() {
        let body = r#"{"error":{"code":"BadRequest","message":"1037: The policy contains invalid data."}}"#;
        let enhanced = enhance_graph_error(body);
        assert!(enhanced.starts_with("BadRequest: 1037"));
        assert!(enhanced.contains("Hint"));
    }

    #[test]
    fn test_enhance_graph_error_passes_through_non_json() {
        assert_eq!(enhance_graph_error("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_geo_exception_error_lists_completed_steps() {
        let err = CaError::GeoExceptionFailed {
            step: "create policy".into(),
            completed: vec!["created location 'Exception-L1' (loc-2)".into()],
            source: Box::new(CaError::GraphApiError("HTTP 400".into())),
        };
        let text = err.to_string();
        assert!(text.contains("create policy"));
        assert!(text.contains("loc-2"));
        assert!(text.contains("HTTP 400"));
        assert!(text.contains("not rolled back"));
        assert_eq!(text.matches("loc-2").count(), 1);
    }
}
