//! Named location construction, edits and reference tracking

pub mod references;
pub mod validate;

pub use references::{plan_location_deletion, DeletionPlan, PolicyReference, ReferenceIndex, Usage};

use crate::error::{CaError, Result};
use crate::graph::conditional_access::{CountryLocation, IpLocation, NamedLocation};
use serde_json::{json, Value};

const COUNTRY_TYPE: &str = "#microsoft.graph.countryNamedLocation";
const IP_TYPE: &str = "#microsoft.graph.ipNamedLocation";

fn require_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CaError::Validation("Location name cannot be empty".into()));
    }
    Ok(name.to_string())
}

/// New (unsaved) country location
pub fn new_country_location<S: AsRef<str>>(
    name: &str,
    countries: &[S],
    include_unknown: bool,
) -> Result<NamedLocation> {
    Ok(NamedLocation::Country(CountryLocation {
        id: String::new(),
        display_name: require_name(name)?,
        countries_and_regions: validate::normalize_country_codes(countries)?,
        include_unknown_countries_and_regions: include_unknown,
        country_lookup_method: None,
    }))
}

/// New (unsaved) IP location from one or more addresses or CIDR ranges
pub fn new_ip_location<S: AsRef<str>>(
    name: &str,
    ranges: &[S],
    trusted: bool,
) -> Result<NamedLocation> {
    let ip_ranges = ranges
        .iter()
        .map(|r| r.as_ref())
        .filter(|r| !r.trim().is_empty())
        .map(validate::parse_cidr)
        .collect::<Result<Vec<_>>>()?;

    if ip_ranges.is_empty() {
        return Err(CaError::Validation(
            "At least one IP address or CIDR range is required".into(),
        ));
    }

    Ok(NamedLocation::Ip(IpLocation {
        id: String::new(),
        display_name: require_name(name)?,
        is_trusted: trusted,
        ip_ranges,
    }))
}

fn odata_type(location: &NamedLocation) -> &'static str {
    match location {
        NamedLocation::Country(_) => COUNTRY_TYPE,
        NamedLocation::Ip(_) => IP_TYPE,
    }
}

/// PATCH body renaming `location`
pub fn rename_patch(location: &NamedLocation, new_name: &str) -> Result<Value> {
    Ok(json!({
        "@odata.type": odata_type(location),
        "displayName": require_name(new_name)?,
    }))
}

/// PATCH body setting `isTrusted`; only IP locations carry the flag
pub fn trusted_patch(location: &NamedLocation, trusted: bool) -> Result<Value> {
    match location {
        NamedLocation::Ip(_) => Ok(json!({
            "@odata.type": IP_TYPE,
            "isTrusted": trusted,
        })),
        NamedLocation::Country(_) => Err(CaError::Validation(format!(
            "'{}' is a country location; only IP locations can be trusted",
            location.display_name()
        ))),
    }
}

/// Case-insensitive lookup by ID or display name
pub fn find_location<'a>(locations: &'a [NamedLocation], key: &str) -> Option<&'a NamedLocation> {
    let key = key.trim();
    locations
        .iter()
        .find(|loc| loc.id().eq_ignore_ascii_case(key))
        .or_else(|| {
            locations
                .iter()
                .find(|loc| loc.display_name().eq_ignore_ascii_case(key))
        })
}
