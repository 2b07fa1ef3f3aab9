//! In-memory `GraphService` for unit tests

use crate::error::{CaError, Result};
use crate::graph::conditional_access::{ConditionalAccessPolicy, NamedLocation};
use crate::graph::users::DirectoryUser;
use crate::graph::GraphService;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeState {
    pub locations: BTreeMap<String, NamedLocation>,
    pub policies: BTreeMap<String, ConditionalAccessPolicy>,
    pub users: Vec<DirectoryUser>,
    /// Reads of a just-created location that still return 404
    pub invisible_reads: u32,
    pub fail_create_policy: bool,
    pub fail_update_policy: bool,
    pub fail_user_lookups: bool,
    pub created_policy_payloads: Vec<Value>,
    pub policy_patches: Vec<(String, Value)>,
    pub deleted_locations: Vec<String>,
    pub location_reads: u32,
    /// Runs once, inside the first `create_policy` call
    pub on_create_policy: Option<Box<dyn FnOnce() + Send>>,
    next_id: u32,
    pending_visibility: BTreeMap<String, u32>,
}

#[derive(Default)]
pub struct FakeGraph {
    pub state: Mutex<FakeState>,
}

pub fn user(id: &str, display_name: &str, upn: &str) -> DirectoryUser {
    DirectoryUser {
        id: id.to_string(),
        display_name: Some(display_name.to_string()),
        user_principal_name: Some(upn.to_string()),
        mail: None,
    }
}

impl FakeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(self, users: Vec<DirectoryUser>) -> Self {
        self.state.lock().unwrap().users = users;
        self
    }

    pub fn with_location(self, location: NamedLocation) -> Self {
        self.state
            .lock()
            .unwrap()
            .locations
            .insert(location.id().to_string(), location);
        self
    }

    pub fn with_policy(self, policy: ConditionalAccessPolicy) -> Self {
        self.state
            .lock()
            .unwrap()
            .policies
            .insert(policy.id.clone(), policy);
        self
    }

    pub fn configure(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    fn next_id(state: &mut FakeState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{}-new-{}", prefix, state.next_id)
    }
}

/// Parses `<attr> eq '<literal>'`
fn parse_eq_filter(filter: &str) -> Option<(&str, String)> {
    let (attr, rest) = filter.split_once(" eq ")?;
    let literal = rest.trim().strip_prefix('\'')?.strip_suffix('\'')?;
    Some((attr.trim(), literal.replace("''", "'")))
}

#[async_trait]
impl GraphService for FakeGraph {
    async fn list_named_locations(&self) -> Result<Vec<NamedLocation>> {
        Ok(self.state.lock().unwrap().locations.values().cloned().collect())
    }

    async fn create_named_location(&self, location: &NamedLocation) -> Result<NamedLocation> {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state, "loc");
        let mut created = location.clone();
        match &mut created {
            NamedLocation::Country(loc) => loc.id = id.clone(),
            NamedLocation::Ip(loc) => loc.id = id.clone(),
        }
        let invisible = state.invisible_reads;
        state.pending_visibility.insert(id.clone(), invisible);
        state.locations.insert(id, created.clone());
        Ok(created)
    }

    async fn get_named_location(&self, id: &str) -> Result<NamedLocation> {
        let mut state = self.state.lock().unwrap();
        state.location_reads += 1;
        if let Some(remaining) = state.pending_visibility.get_mut(id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CaError::NotFound(format!("namedLocations/{}", id)));
            }
        }
        state
            .locations
            .get(id)
            .cloned()
            .ok_or_else(|| CaError::NotFound(format!("namedLocations/{}", id)))
    }

    async fn update_named_location(&self, id: &str, patch: &Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let location = state
            .locations
            .get_mut(id)
            .ok_or_else(|| CaError::NotFound(format!("namedLocations/{}", id)))?;
        if let Some(name) = patch.get("displayName").and_then(Value::as_str) {
            match location {
                NamedLocation::Country(loc) => loc.display_name = name.to_string(),
                NamedLocation::Ip(loc) => loc.display_name = name.to_string(),
            }
        }
        if let (Some(trusted), NamedLocation::Ip(loc)) =
            (patch.get("isTrusted").and_then(Value::as_bool), location)
        {
            loc.is_trusted = trusted;
        }
        Ok(())
    }

    async fn delete_named_location(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .locations
            .remove(id)
            .ok_or_else(|| CaError::NotFound(format!("namedLocations/{}", id)))?;
        state.deleted_locations.push(id.to_string());
        Ok(())
    }

    async fn list_policies(&self) -> Result<Vec<ConditionalAccessPolicy>> {
        Ok(self.state.lock().unwrap().policies.values().cloned().collect())
    }

    async fn get_policy(&self, id: &str) -> Result<ConditionalAccessPolicy> {
        self.state
            .lock()
            .unwrap()
            .policies
            .get(id)
            .cloned()
            .ok_or_else(|| CaError::NotFound(format!("policies/{}", id)))
    }

    async fn create_policy(&self, payload: &Value) -> Result<ConditionalAccessPolicy> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create_policy {
            return Err(CaError::GraphApiError("HTTP 400 Bad Request: BadRequest".into()));
        }
        if let Some(hook) = state.on_create_policy.take() {
            hook();
        }
        state.created_policy_payloads.push(payload.clone());
        let mut policy: ConditionalAccessPolicy = serde_json::from_value(payload.clone())?;
        policy.id = Self::next_id(&mut state, "policy");
        state.policies.insert(policy.id.clone(), policy.clone());
        Ok(policy)
    }

    async fn update_policy(&self, id: &str, patch: &Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_update_policy {
            return Err(CaError::GraphApiError("HTTP 500 Internal Server Error".into()));
        }
        state.policy_patches.push((id.to_string(), patch.clone()));
        let policy = state
            .policies
            .get_mut(id)
            .ok_or_else(|| CaError::NotFound(format!("policies/{}", id)))?;
        if let Some(state_value) = patch.get("state") {
            policy.state = serde_json::from_value(state_value.clone())?;
        }
        if let Some(users) = patch.pointer("/conditions/users") {
            let conditions = policy.conditions.get_or_insert_with(Default::default);
            conditions.users = Some(serde_json::from_value(users.clone())?);
        }
        Ok(())
    }

    async fn delete_policy(&self, id: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .policies
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CaError::NotFound(format!("policies/{}", id)))
    }

    async fn find_users(&self, filter: &str) -> Result<Vec<DirectoryUser>> {
        let state = self.state.lock().unwrap();
        if state.fail_user_lookups {
            return Err(CaError::GraphApiError("HTTP 503 Service Unavailable".into()));
        }
        let (attr, literal) = parse_eq_filter(filter)
            .ok_or_else(|| CaError::Validation(format!("unsupported filter: {}", filter)))?;
        let matches = state
            .users
            .iter()
            .filter(|u| {
                let field = match attr {
                    "userPrincipalName" => u.user_principal_name.as_deref(),
                    "displayName" => u.display_name.as_deref(),
                    _ => None,
                };
                field.is_some_and(|f| f.eq_ignore_ascii_case(&literal))
            })
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn get_user(&self, id: &str) -> Result<DirectoryUser> {
        let state = self.state.lock().unwrap();
        if state.fail_user_lookups {
            return Err(CaError::GraphApiError("HTTP 503 Service Unavailable".into()));
        }
        state
            .users
            .iter()
            .find(|u| u.id.eq_ignore_ascii_case(id))
            .cloned()
            .ok_or_else(|| CaError::NotFound(format!("users/{}", id)))
    }
}
