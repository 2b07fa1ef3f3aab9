//! Geo exception: carve a set of users out of a country-based policy.
//!
//! Runs as a saga over four writes-and-reads:
//!
//! 1. create a country location cloned from the source location
//! 2. poll until the new location is readable
//! 3. create a disabled copy of the source policy that targets only the
//!    exception users and points at the new location
//! 4. add the same users to the source policy's `excludeUsers`
//!
//! Nothing is rolled back. When a step fails after something was written,
//! the error lists what was created so the operator can clean up by hand.
//! Cancellation is honoured while polling and before every write.

use crate::directory::{self, ResolutionResult};
use crate::error::{CaError, Result};
use crate::graph::conditional_access::{
    ConditionalAccessPolicy, CountryLocation, NamedLocation, UserCondition,
};
use crate::graph::GraphService;
use crate::location;
use crate::policy::{copy_policy, sanitize, PolicyDraft};
use crate::poll::{await_condition, CancelSignal, PollSettings};
use serde_json::{json, Value};
use std::fmt;
use tracing::{info, warn};

/// User IDs with special meaning that never name a specific user
const USER_SENTINELS: &[&str] = &["All", "None", "GuestsOrExternalUsers"];

/// Stand-in ID used by dry runs
pub const PLANNED_LOCATION_ID: &str = "<new location>";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoExceptionRequest {
    pub source_policy_id: String,
    pub source_location_id: String,
    /// Name of the location to create
    pub location_name: String,
    pub countries: Vec<String>,
    /// Overrides the source location's unknown-countries flag
    pub include_unknown: Option<bool>,
    /// Free-form user identifiers (object ID, UPN or display name)
    pub users: Vec<String>,
    /// Defaults to `"<source policy> - <location name>"`
    pub policy_name: Option<String>,
}

impl GeoExceptionRequest {
    /// Local checks only. Returns the normalised country codes.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.source_policy_id.trim().is_empty() {
            return Err(CaError::Validation("A source policy is required".into()));
        }
        if self.source_location_id.trim().is_empty() {
            return Err(CaError::Validation("A source location is required".into()));
        }
        if self.location_name.trim().is_empty() {
            return Err(CaError::Validation("Location name cannot be empty".into()));
        }
        if self
            .policy_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(CaError::Validation("Policy name cannot be empty".into()));
        }
        if self.users.iter().all(|u| u.trim().is_empty()) {
            return Err(CaError::Validation(
                "At least one exception user is required".into(),
            ));
        }
        location::validate::normalize_country_codes(self.countries.as_slice())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Idle,
    LocationCreated,
    LocationVerified,
    PolicyCreated,
    OriginalPolicyPatched,
    Done,
    Failed,
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SagaState::Idle => "idle",
            SagaState::LocationCreated => "location created",
            SagaState::LocationVerified => "location verified",
            SagaState::PolicyCreated => "policy created",
            SagaState::OriginalPolicyPatched => "original policy patched",
            SagaState::Done => "done",
            SagaState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct GeoExceptionOutcome {
    pub location: NamedLocation,
    pub policy: ConditionalAccessPolicy,
    pub original_policy_id: String,
    pub resolution: ResolutionResult,
}

/// What a run would do, without doing it
#[derive(Debug, Clone)]
pub struct GeoExceptionPlan {
    pub location: NamedLocation,
    pub policy_payload: Value,
    pub original_policy_patch: Value,
    pub resolution: ResolutionResult,
}

struct SourceObjects {
    policy: ConditionalAccessPolicy,
    location: CountryLocation,
}

pub struct GeoExceptionOrchestrator<'a, S: GraphService + ?Sized> {
    service: &'a S,
    poll: PollSettings,
    cancel: CancelSignal,
    state: SagaState,
    completed: Vec<String>,
}

impl<'a, S: GraphService + ?Sized> GeoExceptionOrchestrator<'a, S> {
    pub fn new(service: &'a S, poll: PollSettings) -> Self {
        Self {
            service,
            poll,
            cancel: CancelSignal::never(),
            state: SagaState::Idle,
            completed: Vec::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Human-readable list of what has been written so far
    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    fn advance(&mut self, state: SagaState, record: String) {
        info!(state = %state, "{}", record);
        self.state = state;
        self.completed.push(record);
    }

    /// Marks the run failed. Errors before the first write pass through
    /// unchanged; later ones carry the list of completed steps.
    fn fail(&mut self, step: &str, error: CaError) -> CaError {
        warn!(step, error = %error, "geo exception failed");
        self.state = SagaState::Failed;
        if self.completed.is_empty() {
            return error;
        }
        CaError::GeoExceptionFailed {
            step: step.to_string(),
            completed: self.completed.clone(),
            source: Box::new(error),
        }
    }

    /// Stops at a step boundary once the run was cancelled
    fn ensure_not_cancelled(&mut self, step: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(self.fail(step, CaError::Cancelled));
        }
        Ok(())
    }

    async fn load_sources(&self, request: &GeoExceptionRequest) -> Result<SourceObjects> {
        let policy = self.service.get_policy(request.source_policy_id.trim()).await?;
        let location = match self
            .service
            .get_named_location(request.source_location_id.trim())
            .await?
        {
            NamedLocation::Country(location) => location,
            other => {
                return Err(CaError::Validation(format!(
                    "'{}' is an {} location; geo exceptions need a country location",
                    other.display_name(),
                    other.kind()
                )))
            }
        };

        let referenced = policy.location_condition().is_some_and(|condition| {
            [&condition.include_locations, &condition.exclude_locations]
                .into_iter()
                .flatten()
                .flatten()
                .any(|id| id.eq_ignore_ascii_case(&location.id))
        });
        if !referenced {
            return Err(CaError::Validation(format!(
                "Policy '{}' does not reference location '{}'",
                policy.display_name, location.display_name
            )));
        }

        Ok(SourceObjects { policy, location })
    }

    fn new_location(
        request: &GeoExceptionRequest,
        source: &CountryLocation,
        countries: &[String],
    ) -> Result<NamedLocation> {
        let include_unknown = request
            .include_unknown
            .unwrap_or(source.include_unknown_countries_and_regions);
        let mut created = location::new_country_location(
            &request.location_name,
            countries,
            include_unknown,
        )?;
        if let NamedLocation::Country(loc) = &mut created {
            loc.country_lookup_method = source.country_lookup_method.clone();
        }
        Ok(created)
    }

    async fn resolve_users(&self, request: &GeoExceptionRequest) -> Result<ResolutionResult> {
        let resolution = directory::resolve(self.service, &request.users).await;
        if resolution.resolved_ids.is_empty() {
            return Err(CaError::Validation(format!(
                "None of the exception users could be resolved: {}",
                resolution.unresolved.join(", ")
            )));
        }
        if !resolution.unresolved.is_empty() {
            warn!(unresolved = ?resolution.unresolved, "some exception users were not resolved");
        }
        Ok(resolution)
    }

    /// Run all four steps
    pub async fn run(&mut self, request: &GeoExceptionRequest) -> Result<GeoExceptionOutcome> {
        self.state = SagaState::Idle;
        self.completed.clear();

        let countries = request.validate()?;
        let sources = self
            .load_sources(request)
            .await
            .map_err(|e| self.fail("load source objects", e))?;
        let new_location = Self::new_location(request, &sources.location, &countries)
            .map_err(|e| self.fail("build location", e))?;

        // 1. create location
        self.ensure_not_cancelled("create location")?;
        let created = self
            .service
            .create_named_location(&new_location)
            .await
            .map_err(|e| self.fail("create location", e))?;
        let location_id = created.id().to_string();
        self.advance(
            SagaState::LocationCreated,
            format!(
                "created named location '{}' ({})",
                created.display_name(),
                location_id
            ),
        );

        // 2. wait until it is readable
        let service = self.service;
        let id = location_id.as_str();
        let verified = await_condition(
            &format!("named location {} to become readable", location_id),
            move || async move { service.get_named_location(id).await.ok() },
            &self.poll,
            &self.cancel,
        )
        .await
        .map_err(|e| self.fail("verify location", e))?;
        self.advance(
            SagaState::LocationVerified,
            format!("verified named location {}", verified.id()),
        );

        // 3. clone the policy for the exception users
        let resolution = self
            .resolve_users(request)
            .await
            .map_err(|e| self.fail("resolve users", e))?;
        let draft = exception_draft(
            &sources,
            request,
            &location_id,
            &resolution.resolved_ids,
        );
        let payload = draft
            .validate()
            .and_then(|_| draft.to_payload())
            .map_err(|e| self.fail("build policy", e))?;
        self.ensure_not_cancelled("create policy")?;
        let policy = self
            .service
            .create_policy(&payload)
            .await
            .map_err(|e| self.fail("create policy", e))?;
        self.advance(
            SagaState::PolicyCreated,
            format!(
                "created disabled policy '{}' ({})",
                policy.display_name, policy.id
            ),
        );

        // 4. exclude the same users from the original
        let patch = exclusion_patch(sources.policy.user_condition(), &resolution.resolved_ids)
            .map_err(|e| self.fail("build original policy patch", e))?;
        self.ensure_not_cancelled("patch original policy")?;
        self.service
            .update_policy(&sources.policy.id, &patch)
            .await
            .map_err(|e| self.fail("patch original policy", e))?;
        self.advance(
            SagaState::OriginalPolicyPatched,
            format!(
                "excluded {} user(s) from '{}'",
                resolution.resolved_ids.len(),
                sources.policy.display_name
            ),
        );

        self.state = SagaState::Done;
        Ok(GeoExceptionOutcome {
            location: verified,
            policy,
            original_policy_id: sources.policy.id,
            resolution,
        })
    }

    /// Validate, load and build every payload without writing anything
    pub async fn plan(&self, request: &GeoExceptionRequest) -> Result<GeoExceptionPlan> {
        let countries = request.validate()?;
        let sources = self.load_sources(request).await?;
        let location = Self::new_location(request, &sources.location, &countries)?;
        let resolution = self.resolve_users(request).await?;

        let draft = exception_draft(
            &sources,
            request,
            PLANNED_LOCATION_ID,
            &resolution.resolved_ids,
        );
        draft.validate()?;

        Ok(GeoExceptionPlan {
            location,
            policy_payload: draft.to_payload()?,
            original_policy_patch: exclusion_patch(
                sources.policy.user_condition(),
                &resolution.resolved_ids,
            )?,
            resolution,
        })
    }
}

/// Union preserving first-seen order; IDs compare case-insensitively
fn merge_ids<'b>(
    existing: impl IntoIterator<Item = &'b String>,
    added: &'b [String],
) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for id in existing.into_iter().chain(added) {
        if !merged.iter().any(|m| m.eq_ignore_ascii_case(id)) {
            merged.push(id.clone());
        }
    }
    merged
}

fn is_sentinel(id: &str) -> bool {
    USER_SENTINELS.iter().any(|s| s.eq_ignore_ascii_case(id))
}

fn exception_draft(
    sources: &SourceObjects,
    request: &GeoExceptionRequest,
    new_location_id: &str,
    user_ids: &[String],
) -> PolicyDraft {
    let name = request
        .policy_name
        .as_deref()
        .map(str::trim)
        .map(String::from)
        .unwrap_or_else(|| {
            format!(
                "{} - {}",
                sources.policy.display_name,
                request.location_name.trim()
            )
        });

    let specific_includes = sources
        .policy
        .user_condition()
        .and_then(|users| users.include_users.as_ref())
        .into_iter()
        .flatten()
        .filter(|id| !is_sentinel(id));

    let mut draft = copy_policy(&sources.policy).with_display_name(name);
    draft.set_users(UserCondition {
        include_users: Some(merge_ids(specific_includes, user_ids)),
        ..Default::default()
    });
    draft.replace_location(&sources.location.id, new_location_id);
    draft
}

/// PATCH body adding `user_ids` to the original policy's `excludeUsers`
fn exclusion_patch(existing: Option<&UserCondition>, user_ids: &[String]) -> Result<Value> {
    let mut users = existing.cloned().unwrap_or_default();
    users.exclude_users = Some(merge_ids(users.exclude_users.iter().flatten(), user_ids));
    Ok(sanitize::sanitize(json!({
        "conditions": { "users": serde_json::to_value(&users)? }
    })))
}
