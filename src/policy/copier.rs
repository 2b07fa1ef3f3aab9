//! Allow-listed deep copy of a policy into a creatable draft.
//!
//! Only modelled fields are copied (see `graph::conditional_access`);
//! blank list entries are dropped, lists that end up empty are omitted and
//! categories that end up empty are omitted. Drafts are always disabled.

use crate::error::{CaError, Result};
use crate::graph::conditional_access::{
    ApplicationCondition, AuthenticationStrengthRef, ClientApplicationCondition,
    ConditionalAccessPolicy, DeviceCondition, DeviceFilter, GrantControls, LocationCondition,
    PlatformCondition, PolicyConditions, PolicyState, SessionControls, UserCondition,
};
use crate::policy::sanitize;
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_GRANT_OPERATOR: &str = "OR";
pub const DEFAULT_BUILT_IN_CONTROL: &str = "block";

/// A policy body ready to POST
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDraft {
    pub display_name: String,
    pub state: PolicyState,
    pub conditions: PolicyConditions,
    pub grant_controls: DraftGrantControls,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_controls: Option<SessionControls>,
}

/// Grant controls with the operator and built-in controls always filled in
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftGrantControls {
    pub operator: String,
    pub built_in_controls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_authentication_factors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_use: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_strength: Option<AuthenticationStrengthRef>,
}

/// Copy of a condition category with empty branches removed
trait CleanCopy: Sized {
    fn clean_copy(&self) -> Option<Self>;
}

fn clean_list(list: &Option<Vec<String>>) -> Option<Vec<String>> {
    let items: Vec<String> = list
        .iter()
        .flatten()
        .filter(|item| !item.trim().is_empty())
        .cloned()
        .collect();
    (!items.is_empty()).then_some(items)
}

fn non_default<T: Default + PartialEq>(value: T) -> Option<T> {
    (value != T::default()).then_some(value)
}

impl CleanCopy for UserCondition {
    fn clean_copy(&self) -> Option<Self> {
        let nested = |value: &Option<Value>| value.clone().and_then(sanitize::prune);
        non_default(UserCondition {
            include_users: clean_list(&self.include_users),
            exclude_users: clean_list(&self.exclude_users),
            include_groups: clean_list(&self.include_groups),
            exclude_groups: clean_list(&self.exclude_groups),
            include_roles: clean_list(&self.include_roles),
            exclude_roles: clean_list(&self.exclude_roles),
            include_guests_or_external_users: nested(&self.include_guests_or_external_users),
            exclude_guests_or_external_users: nested(&self.exclude_guests_or_external_users),
        })
    }
}

impl CleanCopy for ApplicationCondition {
    fn clean_copy(&self) -> Option<Self> {
        non_default(ApplicationCondition {
            include_applications: clean_list(&self.include_applications),
            exclude_applications: clean_list(&self.exclude_applications),
            include_user_actions: clean_list(&self.include_user_actions),
            include_authentication_context_class_references: clean_list(
                &self.include_authentication_context_class_references,
            ),
        })
    }
}

impl CleanCopy for LocationCondition {
    fn clean_copy(&self) -> Option<Self> {
        non_default(LocationCondition {
            include_locations: clean_list(&self.include_locations),
            exclude_locations: clean_list(&self.exclude_locations),
        })
    }
}

impl CleanCopy for PlatformCondition {
    fn clean_copy(&self) -> Option<Self> {
        non_default(PlatformCondition {
            include_platforms: clean_list(&self.include_platforms),
            exclude_platforms: clean_list(&self.exclude_platforms),
        })
    }
}

impl CleanCopy for DeviceFilter {
    fn clean_copy(&self) -> Option<Self> {
        let rule = self.rule.as_ref().filter(|r| !r.trim().is_empty())?;
        Some(DeviceFilter {
            mode: self.mode.clone().filter(|m| !m.trim().is_empty()),
            rule: Some(rule.clone()),
        })
    }
}

impl CleanCopy for DeviceCondition {
    fn clean_copy(&self) -> Option<Self> {
        non_default(DeviceCondition {
            include_devices: clean_list(&self.include_devices),
            exclude_devices: clean_list(&self.exclude_devices),
            device_filter: self.device_filter.as_ref().and_then(CleanCopy::clean_copy),
        })
    }
}

impl CleanCopy for ClientApplicationCondition {
    fn clean_copy(&self) -> Option<Self> {
        non_default(ClientApplicationCondition {
            include_service_principals: clean_list(&self.include_service_principals),
            exclude_service_principals: clean_list(&self.exclude_service_principals),
        })
    }
}

impl CleanCopy for PolicyConditions {
    fn clean_copy(&self) -> Option<Self> {
        non_default(PolicyConditions {
            users: self.users.as_ref().and_then(CleanCopy::clean_copy),
            applications: self.applications.as_ref().and_then(CleanCopy::clean_copy),
            locations: self.locations.as_ref().and_then(CleanCopy::clean_copy),
            platforms: self.platforms.as_ref().and_then(CleanCopy::clean_copy),
            devices: self.devices.as_ref().and_then(CleanCopy::clean_copy),
            client_applications: self
                .client_applications
                .as_ref()
                .and_then(CleanCopy::clean_copy),
            client_app_types: clean_list(&self.client_app_types),
            sign_in_risk_levels: clean_list(&self.sign_in_risk_levels),
            user_risk_levels: clean_list(&self.user_risk_levels),
            service_principal_risk_levels: clean_list(&self.service_principal_risk_levels),
        })
    }
}

impl CleanCopy for SessionControls {
    fn clean_copy(&self) -> Option<Self> {
        let nested = |value: &Option<Value>| value.clone().and_then(sanitize::prune);
        non_default(SessionControls {
            application_enforced_restrictions: nested(&self.application_enforced_restrictions),
            cloud_app_security: nested(&self.cloud_app_security),
            sign_in_frequency: nested(&self.sign_in_frequency),
            persistent_browser: nested(&self.persistent_browser),
            disable_resilience_defaults: self.disable_resilience_defaults,
        })
    }
}

fn copy_grant_controls(source: Option<&GrantControls>) -> DraftGrantControls {
    let source = source.cloned().unwrap_or_default();

    let operator = source
        .operator
        .filter(|op| !op.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_GRANT_OPERATOR.to_string());
    let built_in_controls = clean_list(&source.built_in_controls)
        .unwrap_or_else(|| vec![DEFAULT_BUILT_IN_CONTROL.to_string()]);

    DraftGrantControls {
        operator,
        built_in_controls,
        custom_authentication_factors: clean_list(&source.custom_authentication_factors),
        terms_of_use: clean_list(&source.terms_of_use),
        authentication_strength: source
            .authentication_strength
            .filter(|strength| !strength.id.trim().is_empty()),
    }
}

/// Deep-copy `source` into a disabled draft with the same display name
pub fn copy_policy(source: &ConditionalAccessPolicy) -> PolicyDraft {
    PolicyDraft {
        display_name: source.display_name.clone(),
        state: PolicyState::Disabled,
        conditions: source
            .conditions
            .as_ref()
            .and_then(CleanCopy::clean_copy)
            .unwrap_or_default(),
        grant_controls: copy_grant_controls(source.grant_controls.as_ref()),
        session_controls: source
            .session_controls
            .as_ref()
            .and_then(CleanCopy::clean_copy),
    }
}

/// IDs in `list` with `old` swapped for `new`, order kept
fn swap_id(list: &mut Option<Vec<String>>, old: &str, new: &str) -> bool {
    let mut swapped = false;
    for item in list.iter_mut().flatten() {
        if item.eq_ignore_ascii_case(old) {
            *item = new.to_string();
            swapped = true;
        }
    }
    swapped
}

impl PolicyDraft {
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Replace every reference to location `old` (include and exclude)
    /// with `new`. Returns whether anything was replaced.
    pub fn replace_location(&mut self, old: &str, new: &str) -> bool {
        let Some(locations) = self.conditions.locations.as_mut() else {
            return false;
        };
        let included = swap_id(&mut locations.include_locations, old, new);
        let excluded = swap_id(&mut locations.exclude_locations, old, new);
        included || excluded
    }

    pub fn set_users(&mut self, users: UserCondition) {
        self.conditions.users = users.clean_copy();
    }

    /// Checks Graph would otherwise reject after the round trip
    pub fn validate(&self) -> Result<()> {
        if self.display_name.trim().is_empty() {
            return Err(CaError::Validation("Policy name cannot be empty".into()));
        }

        let has_include = self.conditions.users.as_ref().is_some_and(|users| {
            [&users.include_users, &users.include_groups, &users.include_roles]
                .into_iter()
                .any(|list| list.as_ref().is_some_and(|l| !l.is_empty()))
                || users.include_guests_or_external_users.is_some()
        });
        if !has_include {
            return Err(CaError::Validation(format!(
                "Policy '{}' must include at least one user, group or role (or All)",
                self.display_name
            )));
        }

        Ok(())
    }

    /// Serialised and pruned body for `createPolicy`
    pub fn to_payload(&self) -> Result<Value> {
        Ok(sanitize::sanitize(serde_json::to_value(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy(value: Value) -> ConditionalAccessPolicy {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_copy_drops_empty_fields_and_categories() {
        let source = policy(json!({
            "id": "p1",
            "displayName": "Require MFA",
            "state": "enabled",
            "conditions": {
                "users": { "includeUsers": ["All"], "excludeUsers": [], "excludeGroups": ["", "g1"] },
                "applications": { "includeApplications": ["All"], "excludeApplications": [] },
                "platforms": { "includePlatforms": [], "excludePlatforms": null },
                "locations": { "includeLocations": [""] },
                "clientAppTypes": ["all"],
                "signInRiskLevels": []
            },
            "grantControls": { "operator": "OR", "builtInControls": ["mfa"] }
        }));

        let draft = copy_policy(&source);
        assert_eq!(draft.state, PolicyState::Disabled);

        let payload = draft.to_payload().unwrap();
        assert_eq!(
            payload,
            json!({
                "displayName": "Require MFA",
                "state": "disabled",
                "conditions": {
                    "users": { "includeUsers": ["All"], "excludeGroups": ["g1"] },
                    "applications": { "includeApplications": ["All"] },
                    "clientAppTypes": ["all"]
                },
                "grantControls": { "operator": "OR", "builtInControls": ["mfa"] }
            })
        );
    }

    #[test]
    fn test_grant_defaults_for_degenerate_source() {
        let source = policy(json!({
            "displayName": "Legacy",
            "state": "enabled",
            "conditions": { "users": { "includeUsers": "All" } }
        }));

        let payload = copy_policy(&source).to_payload().unwrap();
        assert_eq!(payload["grantControls"]["operator"], "OR");
        assert_eq!(payload["grantControls"]["builtInControls"], json!(["block"]));

        let blank = policy(json!({
            "displayName": "Blank",
            "state": "disabled",
            "grantControls": { "operator": "", "builtInControls": [null, ""] }
        }));
        let grant = copy_policy(&blank).grant_controls;
        assert_eq!(grant.operator, "OR");
        assert_eq!(grant.built_in_controls, vec!["block".to_string()]);
    }

    #[test]
    fn test_session_controls_are_pruned() {
        let source = policy(json!({
            "displayName": "Session",
            "state": "enabled",
            "conditions": { "users": { "includeUsers": ["All"] } },
            "sessionControls": {
                "signInFrequency": { "value": 4, "type": "hours", "isEnabled": true, "authenticationType": null },
                "persistentBrowser": null,
                "cloudAppSecurity": { "isEnabled": null }
            }
        }));

        let payload = copy_policy(&source).to_payload().unwrap();
        assert_eq!(
            payload["sessionControls"],
            json!({ "signInFrequency": { "value": 4, "type": "hours", "isEnabled": true } })
        );
    }

    #[test]
    fn test_guest_scoping_is_copied_without_nulls() {
        let source = policy(json!({
            "id": "p1",
            "displayName": "Block guests",
            "state": "enabled",
            "conditions": {
                "users": {
                    "includeGuestsOrExternalUsers": {
                        "guestOrExternalUserTypes": "internalGuest",
                        "externalTenants": null
                    },
                    "excludeGuestsOrExternalUsers": null
                }
            }
        }));

        let payload = copy_policy(&source).to_payload().unwrap();
        assert_eq!(
            payload["conditions"]["users"],
            json!({ "includeGuestsOrExternalUsers": { "guestOrExternalUserTypes": "internalGuest" } })
        );
        assert!(copy_policy(&source).validate().is_ok());
    }

    #[test]
    fn test_device_filter_without_rule_is_omitted() {
        let source = policy(json!({
            "displayName": "Devices",
            "state": "enabled",
            "conditions": {
                "users": { "includeUsers": ["All"] },
                "devices": { "deviceFilter": { "mode": "include", "rule": "" } }
            }
        }));

        assert!(copy_policy(&source).conditions.devices.is_none());
    }

    #[test]
    fn test_replace_location_in_both_lists() {
        let source = policy(json!({
            "displayName": "Geo",
            "state": "enabled",
            "conditions": {
                "users": { "includeUsers": ["All"] },
                "locations": { "includeLocations": ["All"], "excludeLocations": ["L1", "L9"] }
            }
        }));

        let mut draft = copy_policy(&source);
        assert!(draft.replace_location("L1", "L2"));
        assert!(!draft.replace_location("missing", "L3"));

        let locations = draft.conditions.locations.unwrap();
        assert_eq!(locations.include_locations, Some(vec!["All".to_string()]));
        assert_eq!(
            locations.exclude_locations,
            Some(vec!["L2".to_string(), "L9".to_string()])
        );
    }

    #[test]
    fn test_validate_requires_an_include() {
        let source = policy(json!({
            "displayName": "Exclude only",
            "state": "enabled",
            "conditions": { "users": { "excludeUsers": ["u1"] } }
        }));

        let draft = copy_policy(&source);
        assert!(matches!(draft.validate(), Err(CaError::Validation(_))));

        let mut fixed = draft.clone();
        fixed.set_users(UserCondition {
            include_roles: Some(vec!["62e90394-69f5-4237-9190-012177145e10".into()]),
            ..Default::default()
        });
        assert!(fixed.validate().is_ok());
        assert!(fixed
            .with_display_name("  ")
            .validate()
            .is_err());
    }
}
