//! Which policies reference which named locations.
//!
//! Rebuilt from fresh listings whenever it is needed and never persisted.
//! Only IDs of known named locations are indexed; the `All` and
//! `AllTrusted` sentinels and dangling IDs are ignored.

use crate::graph::conditional_access::{ConditionalAccessPolicy, NamedLocation};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    Include,
    Exclude,
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Usage::Include => write!(f, "include"),
            Usage::Exclude => write!(f, "exclude"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyReference {
    pub policy_id: String,
    pub policy_name: String,
    pub usage: Usage,
}

impl fmt::Display for PolicyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.policy_name, self.usage)
    }
}

#[derive(Debug, Clone, Default)]
struct Entry {
    location_name: String,
    references: Vec<PolicyReference>,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    // keyed by lower-cased location ID
    entries: BTreeMap<String, Entry>,
}

fn key(id: &str) -> String {
    id.to_ascii_lowercase()
}

impl ReferenceIndex {
    pub fn build(locations: &[NamedLocation], policies: &[ConditionalAccessPolicy]) -> Self {
        let mut entries: BTreeMap<String, Entry> = locations
            .iter()
            .map(|loc| {
                (
                    key(loc.id()),
                    Entry {
                        location_name: loc.display_name().to_string(),
                        references: Vec::new(),
                    },
                )
            })
            .collect();

        for policy in policies {
            let Some(condition) = policy.location_condition() else {
                continue;
            };
            let lists = [
                (Usage::Include, &condition.include_locations),
                (Usage::Exclude, &condition.exclude_locations),
            ];
            for (usage, ids) in lists {
                for id in ids.iter().flatten() {
                    let Some(entry) = entries.get_mut(&key(id)) else {
                        continue;
                    };
                    let reference = PolicyReference {
                        policy_id: policy.id.clone(),
                        policy_name: policy.display_name.clone(),
                        usage,
                    };
                    if !entry.references.contains(&reference) {
                        entry.references.push(reference);
                    }
                }
            }
        }

        Self { entries }
    }

    pub fn contains(&self, location_id: &str) -> bool {
        self.entries.contains_key(&key(location_id))
    }

    pub fn location_name(&self, location_id: &str) -> Option<&str> {
        self.entries
            .get(&key(location_id))
            .map(|e| e.location_name.as_str())
    }

    /// References to `location_id`; empty for unreferenced or unknown IDs
    pub fn references(&self, location_id: &str) -> &[PolicyReference] {
        self.entries
            .get(&key(location_id))
            .map(|e| e.references.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_referenced(&self, location_id: &str) -> bool {
        !self.references(location_id).is_empty()
    }

    /// `"Policy A (include), Policy B (exclude)"`, or empty
    pub fn referenced_by(&self, location_id: &str) -> String {
        self.references(location_id)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLocation {
    pub location_id: String,
    pub location_name: Option<String>,
    pub reason: String,
    pub references: Vec<PolicyReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionPlan {
    pub deletable: Vec<String>,
    pub skipped: Vec<SkippedLocation>,
}

/// Splits `location_ids` into those safe to delete and those that are not
pub fn plan_location_deletion(index: &ReferenceIndex, location_ids: &[String]) -> DeletionPlan {
    let mut plan = DeletionPlan::default();

    for id in location_ids {
        if !index.contains(id) {
            plan.skipped.push(SkippedLocation {
                location_id: id.clone(),
                location_name: None,
                reason: "named location not found".into(),
                references: Vec::new(),
            });
            continue;
        }

        let references = index.references(id);
        if references.is_empty() {
            if !plan.deletable.contains(id) {
                plan.deletable.push(id.clone());
            }
            continue;
        }

        let noun = if references.len() == 1 { "policy" } else { "policies" };
        plan.skipped.push(SkippedLocation {
            location_id: id.clone(),
            location_name: index.location_name(id).map(String::from),
            reason: format!(
                "referenced by {} {}: {}",
                references.len(),
                noun,
                index.referenced_by(id)
            ),
            references: references.to_vec(),
        });
    }

    plan
}
