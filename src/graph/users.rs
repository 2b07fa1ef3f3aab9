//! Directory user lookups

use crate::error::{CaError, Result};
use crate::graph::GraphClient;
use serde::{Deserialize, Serialize};

const USER_SELECT: &str = "id,displayName,userPrincipalName,mail";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
}

/// Quote a value for use inside an OData string literal
pub fn odata_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Query string for `users` with the given `$filter`, percent-encoded
fn users_query(filter: &str) -> Result<String> {
    let url = reqwest::Url::parse_with_params(
        "https://graph.invalid/users",
        &[("$filter", filter), ("$select", USER_SELECT)],
    )
    .map_err(|e| CaError::Validation(format!("Invalid user filter '{}': {}", filter, e)))?;

    // form encoding writes spaces as '+'; a literal '+' is already %2B
    let query = url.query().unwrap_or_default().replace('+', "%20");
    Ok(format!("users?{}", query))
}

/// Users matching an OData filter expression
pub async fn find_users(client: &GraphClient, filter: &str) -> Result<Vec<DirectoryUser>> {
    client.get_all_pages(&users_query(filter)?).await
}

pub async fn get_user(client: &GraphClient, user_id: &str) -> Result<DirectoryUser> {
    client
        .get(&format!("users/{}?$select={}", user_id, USER_SELECT))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odata_quote_doubles_single_quotes() {
        assert_eq!(odata_quote("o'brien@contoso.com"), "'o''brien@contoso.com'");
    }

    #[test]
    fn test_users_query_is_encoded() {
        let query = users_query("displayName eq 'Alice & Bob'").unwrap();
        assert!(query.starts_with("users?%24filter=") || query.starts_with("users?$filter="));
        assert!(!query.contains(' '));
        assert!(query.contains("%26"));
    }
}
