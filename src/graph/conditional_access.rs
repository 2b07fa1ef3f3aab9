//! Conditional Access policies and Named Locations via Microsoft Graph
//!
//! Typed models for the objects this tool reads and writes, plus thin
//! endpoint wrappers. The typed structs double as the field allow-list:
//! anything Graph returns that is not modelled here is dropped on
//! deserialisation and never sent back.

use crate::error::Result;
use crate::graph::GraphClient;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

const POLICIES: &str = "identity/conditionalAccess/policies";
const NAMED_LOCATIONS: &str = "identity/conditionalAccess/namedLocations";

/// String lists may arrive as an array or a bare string; `null` entries are dropped
mod string_list {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<Option<String>>),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
            None => None,
            Some(OneOrMany::One(item)) => Some(vec![item]),
            Some(OneOrMany::Many(items)) => Some(items.into_iter().flatten().collect()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyState {
    Enabled,
    Disabled,
    EnabledForReportingButNotEnforced,
}

impl fmt::Display for PolicyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyState::Enabled => write!(f, "enabled"),
            PolicyState::Disabled => write!(f, "disabled"),
            PolicyState::EnabledForReportingButNotEnforced => write!(f, "report-only"),
        }
    }
}

/// Conditional Access Policy structure for typed responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalAccessPolicy {
    #[serde(default)]
    pub id: String,
    pub display_name: String,
    pub state: PolicyState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<PolicyConditions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_controls: Option<GrantControls>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_controls: Option<SessionControls>,
}

impl ConditionalAccessPolicy {
    pub fn location_condition(&self) -> Option<&LocationCondition> {
        self.conditions.as_ref()?.locations.as_ref()
    }

    pub fn user_condition(&self) -> Option<&UserCondition> {
        self.conditions.as_ref()?.users.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<UserCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications: Option<ApplicationCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<LocationCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<PlatformCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<DeviceCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_applications: Option<ClientApplicationCondition>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_app_types: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub sign_in_risk_levels: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_risk_levels: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub service_principal_risk_levels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCondition {
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_users: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_users: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_groups: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_groups: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_roles: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_roles: Option<Vec<String>>,
    /// `conditionalAccessGuestsOrExternalUsers`, kept as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_guests_or_external_users: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_guests_or_external_users: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationCondition {
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_applications: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_applications: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_user_actions: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_authentication_context_class_references: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationCondition {
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_locations: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_locations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformCondition {
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_platforms: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_platforms: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCondition {
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_devices: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_devices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_filter: Option<DeviceFilter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientApplicationCondition {
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_service_principals: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_service_principals: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantControls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub built_in_controls: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_authentication_factors: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "string_list::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub terms_of_use: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_strength: Option<AuthenticationStrengthRef>,
}

/// Only the id is needed to reference an authentication strength policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationStrengthRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionControls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_enforced_restrictions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_app_security: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_in_frequency: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_browser: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_resilience_defaults: Option<bool>,
}

// ============================================================================
// Named Locations
// ============================================================================

/// A named location, discriminated by `@odata.type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@odata.type")]
pub enum NamedLocation {
    #[serde(rename = "#microsoft.graph.countryNamedLocation")]
    Country(CountryLocation),
    #[serde(rename = "#microsoft.graph.ipNamedLocation")]
    Ip(IpLocation),
}

impl NamedLocation {
    pub fn id(&self) -> &str {
        match self {
            NamedLocation::Country(loc) => &loc.id,
            NamedLocation::Ip(loc) => &loc.id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            NamedLocation::Country(loc) => &loc.display_name,
            NamedLocation::Ip(loc) => &loc.display_name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NamedLocation::Country(_) => "Country",
            NamedLocation::Ip(_) => "IP",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryLocation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub countries_and_regions: Vec<String>,
    #[serde(default)]
    pub include_unknown_countries_and_regions: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_lookup_method: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpLocation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub is_trusted: bool,
    #[serde(default)]
    pub ip_ranges: Vec<IpRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@odata.type")]
pub enum IpRange {
    #[serde(rename = "#microsoft.graph.iPv4CidrRange")]
    V4 {
        #[serde(rename = "cidrAddress")]
        cidr_address: String,
    },
    #[serde(rename = "#microsoft.graph.iPv6CidrRange")]
    V6 {
        #[serde(rename = "cidrAddress")]
        cidr_address: String,
    },
}

impl IpRange {
    pub fn cidr(&self) -> &str {
        match self {
            IpRange::V4 { cidr_address } | IpRange::V6 { cidr_address } => cidr_address,
        }
    }
}

// ============================================================================
// Endpoints
// ============================================================================

pub async fn list_policies(client: &GraphClient) -> Result<Vec<ConditionalAccessPolicy>> {
    client.get_all_pages(POLICIES).await
}

pub async fn get_policy(client: &GraphClient, policy_id: &str) -> Result<ConditionalAccessPolicy> {
    client.get(&format!("{}/{}", POLICIES, policy_id)).await
}

pub async fn create_policy(client: &GraphClient, policy: &Value) -> Result<ConditionalAccessPolicy> {
    client.post(POLICIES, policy).await
}

pub async fn update_policy(client: &GraphClient, policy_id: &str, patch: &Value) -> Result<()> {
    client
        .patch_no_response(&format!("{}/{}", POLICIES, policy_id), patch)
        .await
}

pub async fn delete_policy(client: &GraphClient, policy_id: &str) -> Result<()> {
    client.delete(&format!("{}/{}", POLICIES, policy_id)).await
}

pub async fn list_named_locations(client: &GraphClient) -> Result<Vec<NamedLocation>> {
    client.get_all_pages(NAMED_LOCATIONS).await
}

pub async fn get_named_location(client: &GraphClient, location_id: &str) -> Result<NamedLocation> {
    client
        .get(&format!("{}/{}", NAMED_LOCATIONS, location_id))
        .await
}

pub async fn create_named_location(
    client: &GraphClient,
    location: &NamedLocation,
) -> Result<NamedLocation> {
    client.post(NAMED_LOCATIONS, location).await
}

/// Graph requires `@odata.type` in every named location PATCH body
pub async fn update_named_location(
    client: &GraphClient,
    location_id: &str,
    patch: &Value,
) -> Result<()> {
    client
        .patch_no_response(&format!("{}/{}", NAMED_LOCATIONS, location_id), patch)
        .await
}

pub async fn delete_named_location(client: &GraphClient, location_id: &str) -> Result<()> {
    client
        .delete(&format!("{}/{}", NAMED_LOCATIONS, location_id))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_location_field_becomes_list() {
        let policy: ConditionalAccessPolicy = serde_json::from_value(json!({
            "id": "p1",
            "displayName": "Block CN",
            "state": "enabled",
            "conditions": {
                "locations": { "includeLocations": "loc-1", "excludeLocations": ["loc-2", null] }
            }
        }))
        .unwrap();

        let locations = policy.location_condition().unwrap();
        assert_eq!(locations.include_locations, Some(vec!["loc-1".to_string()]));
        assert_eq!(locations.exclude_locations, Some(vec!["loc-2".to_string()]));
    }

    #[test]
    fn test_unmodelled_fields_are_dropped() {
        let policy: ConditionalAccessPolicy = serde_json::from_value(json!({
            "displayName": "p",
            "state": "disabled",
            "templateId": "x",
            "conditions": { "users": { "includeUsers": ["All"], "includeGuestsOrExternalUsers": null }, "insiderRiskLevels": "minor" }
        }))
        .unwrap();

        let value = serde_json::to_value(&policy).unwrap();
        assert!(value.get("templateId").is_none());
        assert!(value["conditions"].get("insiderRiskLevels").is_none());
        assert_eq!(value["conditions"]["users"], json!({ "includeUsers": ["All"] }));
    }

    #[test]
    fn test_policy_state_wire_names() {
        assert_eq!(
            serde_json::to_value(PolicyState::EnabledForReportingButNotEnforced).unwrap(),
            json!("enabledForReportingButNotEnforced")
        );
        assert_eq!(PolicyState::Disabled.to_string(), "disabled");
    }

    #[test]
    fn test_named_location_tagged_union() {
        let country: NamedLocation = serde_json::from_value(json!({
            "@odata.type": "#microsoft.graph.countryNamedLocation",
            "id": "loc-1",
            "displayName": "High risk",
            "countriesAndRegions": ["CN", "RU"],
            "includeUnknownCountriesAndRegions": false
        }))
        .unwrap();
        assert_eq!(country.kind(), "Country");
        assert_eq!(country.id(), "loc-1");

        let ip: NamedLocation = serde_json::from_value(json!({
            "@odata.type": "#microsoft.graph.ipNamedLocation",
            "id": "loc-2",
            "displayName": "HQ",
            "isTrusted": true,
            "ipRanges": [{ "@odata.type": "#microsoft.graph.iPv4CidrRange", "cidrAddress": "203.0.113.0/24" }]
        }))
        .unwrap();
        match ip {
            NamedLocation::Ip(loc) => {
                assert!(loc.is_trusted);
                assert_eq!(loc.ip_ranges[0].cidr(), "203.0.113.0/24");
            }
            other => panic!("expected IP location, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_location_type_is_rejected() {
        let result = serde_json::from_value::<NamedLocation>(json!({
            "@odata.type": "#microsoft.graph.compliantNetworkNamedLocation",
            "id": "loc-3",
            "displayName": "GSA"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_new_location_serializes_without_id() {
        let location = NamedLocation::Country(CountryLocation {
            display_name: "Exception".into(),
            countries_and_regions: vec!["CN".into()],
            ..Default::default()
        });
        let value = serde_json::to_value(&location).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["@odata.type"], "#microsoft.graph.countryNamedLocation");
    }
}
