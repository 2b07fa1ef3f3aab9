//! Free-form user identifiers to directory object IDs.
//!
//! Each input is tried as an object ID (when it looks like a GUID), then as
//! a user principal name, then as a display name. A lookup error, no match,
//! or more than one match counts as unresolved; resolution never fails as a
//! whole.

use crate::graph::users::odata_quote;
use crate::graph::GraphService;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

static GUID_PATTERN: OnceLock<Regex> = OnceLock::new();

fn guid_pattern() -> &'static Regex {
    GUID_PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
            .expect("GUID pattern is a valid regex")
    })
}

pub fn is_guid(value: &str) -> bool {
    guid_pattern().is_match(value)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionResult {
    /// Object IDs in input order
    pub resolved_ids: Vec<String>,
    /// Trimmed inputs that did not resolve, in input order
    pub unresolved: Vec<String>,
}

impl ResolutionResult {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Resolve each non-blank input. Duplicates are not collapsed.
pub async fn resolve<S>(service: &S, inputs: &[String]) -> ResolutionResult
where
    S: GraphService + ?Sized,
{
    let mut result = ResolutionResult::default();

    for input in inputs.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        match resolve_one(service, input).await {
            Some(id) => {
                debug!(input, id = %id, "resolved user");
                result.resolved_ids.push(id);
            }
            None => {
                debug!(input, "could not resolve user");
                result.unresolved.push(input.to_string());
            }
        }
    }

    result
}

async fn resolve_one<S>(service: &S, input: &str) -> Option<String>
where
    S: GraphService + ?Sized,
{
    if is_guid(input) {
        return match service.get_user(input).await {
            Ok(user) => Some(user.id),
            Err(e) => {
                debug!(input, error = %e, "object ID lookup failed");
                None
            }
        };
    }

    if let Some(id) = lookup_unique(service, "userPrincipalName", input).await {
        return Some(id);
    }
    lookup_unique(service, "displayName", input).await
}

/// The single user whose `attribute` equals `value`
async fn lookup_unique<S>(service: &S, attribute: &str, value: &str) -> Option<String>
where
    S: GraphService + ?Sized,
{
    let filter = format!("{} eq {}", attribute, odata_quote(value));
    match service.find_users(&filter).await {
        Ok(mut users) if users.len() == 1 => users.pop().map(|u| u.id),
        Ok(users) => {
            if users.len() > 1 {
                debug!(attribute, value, matches = users.len(), "ambiguous user match");
            }
            None
        }
        Err(e) => {
            debug!(attribute, value, error = %e, "user lookup failed");
            None
        }
    }
}
