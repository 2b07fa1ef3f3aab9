//! Every operator action as a value, and the single place that runs them.
//!
//! The CLI turns arguments into an [`Action`], calls [`dispatch`] and
//! renders the [`Outcome`]. When the target of an action disappeared
//! between listing and acting, the relevant list is re-read and returned as
//! [`Outcome::TargetVanished`] instead of an error.

use crate::config::Config;
use crate::directory::{self, ResolutionResult};
use crate::error::{CaError, Result};
use crate::geo_exception::{
    GeoExceptionOrchestrator, GeoExceptionOutcome, GeoExceptionPlan, GeoExceptionRequest,
};
use crate::graph::conditional_access::{ConditionalAccessPolicy, NamedLocation, PolicyState};
use crate::graph::GraphService;
use crate::location::{self, references::SkippedLocation, ReferenceIndex};
use crate::policy::copy_policy;
use crate::poll::{CancelSignal, PollSettings};
use serde_json::json;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum Action {
    ListPolicies,
    ShowPolicy { id: String },
    ClonePolicy { id: String, name: Option<String> },
    SetPolicyState { id: String, state: PolicyState },
    DeletePolicies { ids: Vec<String> },
    ListLocations,
    CreateLocation { location: NamedLocation },
    RenameLocation { id: String, name: String },
    SetLocationTrusted { id: String, trusted: bool },
    DeleteLocations { ids: Vec<String> },
    ResolveUsers { inputs: Vec<String> },
    GeoException { request: GeoExceptionRequest, dry_run: bool },
}

/// Named locations with the policies that reference each of them
#[derive(Debug, Clone)]
pub struct LocationListing {
    pub locations: Vec<NamedLocation>,
    pub index: ReferenceIndex,
}

#[derive(Debug, Clone)]
pub enum Refreshed {
    Policies(Vec<ConditionalAccessPolicy>),
    Locations(LocationListing),
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Policies(Vec<ConditionalAccessPolicy>),
    Policy(ConditionalAccessPolicy),
    PolicyCreated(ConditionalAccessPolicy),
    PolicyStateChanged { id: String, state: PolicyState },
    PoliciesDeleted { deleted: Vec<String>, vanished: Vec<String> },
    Locations(LocationListing),
    LocationCreated(NamedLocation),
    LocationUpdated { id: String, change: String },
    LocationsDeleted {
        deleted: Vec<String>,
        vanished: Vec<String>,
        skipped: Vec<SkippedLocation>,
    },
    Resolution(ResolutionResult),
    GeoExceptionCreated(Box<GeoExceptionOutcome>),
    GeoExceptionPlanned(Box<GeoExceptionPlan>),
    /// The target no longer exists; carries the freshly read list
    TargetVanished { target: String, refreshed: Refreshed },
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub poll: PollSettings,
    pub cancel: CancelSignal,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll: PollSettings::from(&config.geo_exception),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}

enum Target {
    Policy,
    Location,
}

pub async fn dispatch<S>(service: &S, settings: &DispatchSettings, action: Action) -> Result<Outcome>
where
    S: GraphService + ?Sized,
{
    debug!(?action, "dispatching");

    let (target, description) = match &action {
        Action::ShowPolicy { id }
        | Action::ClonePolicy { id, .. }
        | Action::SetPolicyState { id, .. } => (Target::Policy, format!("policy {}", id)),
        Action::GeoException { request, .. } => (
            Target::Policy,
            format!(
                "policy {} or location {}",
                request.source_policy_id, request.source_location_id
            ),
        ),
        Action::RenameLocation { id, .. } | Action::SetLocationTrusted { id, .. } => {
            (Target::Location, format!("named location {}", id))
        }
        _ => return run(service, settings, action).await,
    };

    match run(service, settings, action).await {
        Err(e) if e.is_not_found() => {
            info!(what = %description, "target vanished, refreshing");
            let refreshed = match target {
                Target::Policy => Refreshed::Policies(service.list_policies().await?),
                Target::Location => Refreshed::Locations(list_locations(service).await?),
            };
            Ok(Outcome::TargetVanished {
                target: description,
                refreshed,
            })
        }
        other => other,
    }
}

async fn run<S>(service: &S, settings: &DispatchSettings, action: Action) -> Result<Outcome>
where
    S: GraphService + ?Sized,
{
    match action {
        Action::ListPolicies => Ok(Outcome::Policies(service.list_policies().await?)),
        Action::ShowPolicy { id } => Ok(Outcome::Policy(service.get_policy(&id).await?)),
        Action::ClonePolicy { id, name } => clone_policy(service, &id, name).await,
        Action::SetPolicyState { id, state } => {
            service.update_policy(&id, &json!({ "state": state })).await?;
            Ok(Outcome::PolicyStateChanged { id, state })
        }
        Action::DeletePolicies { ids } => {
            let (deleted, vanished) =
                delete_each(&ids, |id| async move { service.delete_policy(id).await }).await?;
            Ok(Outcome::PoliciesDeleted { deleted, vanished })
        }
        Action::ListLocations => Ok(Outcome::Locations(list_locations(service).await?)),
        Action::CreateLocation { location } => create_location(service, location).await,
        Action::RenameLocation { id, name } => {
            let existing = service.get_named_location(&id).await?;
            let patch = location::rename_patch(&existing, &name)?;
            service.update_named_location(&id, &patch).await?;
            Ok(Outcome::LocationUpdated {
                id,
                change: format!("renamed to '{}'", name.trim()),
            })
        }
        Action::SetLocationTrusted { id, trusted } => {
            let existing = service.get_named_location(&id).await?;
            let patch = location::trusted_patch(&existing, trusted)?;
            service.update_named_location(&id, &patch).await?;
            Ok(Outcome::LocationUpdated {
                id,
                change: format!("trusted: {}", trusted),
            })
        }
        Action::DeleteLocations { ids } => delete_locations(service, &ids).await,
        Action::ResolveUsers { inputs } => Ok(Outcome::Resolution(
            directory::resolve(service, &inputs).await,
        )),
        Action::GeoException { request, dry_run } => {
            let mut saga = GeoExceptionOrchestrator::new(service, settings.poll)
                .with_cancel(settings.cancel.clone());
            if dry_run {
                Ok(Outcome::GeoExceptionPlanned(Box::new(saga.plan(&request).await?)))
            } else {
                Ok(Outcome::GeoExceptionCreated(Box::new(saga.run(&request).await?)))
            }
        }
    }
}

pub async fn list_locations<S>(service: &S) -> Result<LocationListing>
where
    S: GraphService + ?Sized,
{
    let locations = service.list_named_locations().await?;
    let policies = service.list_policies().await?;
    let index = ReferenceIndex::build(&locations, &policies);
    Ok(LocationListing { locations, index })
}

async fn clone_policy<S>(service: &S, id: &str, name: Option<String>) -> Result<Outcome>
where
    S: GraphService + ?Sized,
{
    let source = service.get_policy(id).await?;
    let name = name.unwrap_or_else(|| format!("Copy of {}", source.display_name));
    let draft = copy_policy(&source).with_display_name(name);
    draft.validate()?;

    let created = service.create_policy(&draft.to_payload()?).await?;
    info!(source = %source.id, id = %created.id, "cloned policy");
    Ok(Outcome::PolicyCreated(created))
}

async fn create_location<S>(service: &S, location: NamedLocation) -> Result<Outcome>
where
    S: GraphService + ?Sized,
{
    let existing = service.list_named_locations().await?;
    if let Some(clash) = existing
        .iter()
        .find(|loc| loc.display_name().eq_ignore_ascii_case(location.display_name()))
    {
        return Err(CaError::Validation(format!(
            "Named location '{}' already exists (ID: {})",
            clash.display_name(),
            clash.id()
        )));
    }

    let created = service.create_named_location(&location).await?;
    info!(id = %created.id(), kind = created.kind(), "created named location");
    Ok(Outcome::LocationCreated(created))
}

async fn delete_locations<S>(service: &S, ids: &[String]) -> Result<Outcome>
where
    S: GraphService + ?Sized,
{
    let listing = list_locations(service).await?;
    let plan = location::plan_location_deletion(&listing.index, ids);

    let (deleted, vanished) = delete_each(&plan.deletable, |id| async move {
        service.delete_named_location(id).await
    })
    .await?;

    Ok(Outcome::LocationsDeleted {
        deleted,
        vanished,
        skipped: plan.skipped,
    })
}

/// Deletes in order. NotFound is collected rather than fatal; any other
/// error stops the run.
async fn delete_each<'a, F, Fut>(
    ids: &'a [String],
    mut delete: F,
) -> Result<(Vec<String>, Vec<String>)>
where
    F: FnMut(&'a str) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut deleted = Vec::new();
    let mut vanished = Vec::new();

    for id in ids {
        match delete(id.as_str()).await {
            Ok(()) => deleted.push(id.clone()),
            Err(e) if e.is_not_found() => vanished.push(id.clone()),
            Err(e) => return Err(e),
        }
    }

    Ok((deleted, vanished))
}
