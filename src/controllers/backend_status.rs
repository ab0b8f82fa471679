use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt, StreamExt};
use kube::{
    api::{ApiResource, DynamicObject, GroupVersionKind},
    runtime::{
        controller::Action,
        watcher::{self, Config},
        Controller, WatchStreamExt,
    },
    Api, Client, ResourceExt,
};
use serde_json::Value;
use tracing::{debug, span, warn, Instrument, Level};
use typed_builder::TypedBuilder;

use super::{ControllerError, RECONCILE_ERROR_WAIT};
use crate::{
    common::{
        NamespacedName, BACKEND_NAMESPACE_LABEL, BACKEND_NAME_LABEL, CONDITION_STATUS_TRUE, GATEWAY_NAMESPACE_LABEL, GATEWAY_NAME_LABEL, PROGRAMMED_CONDITION_TYPE, ROUTE_KIND_LABEL,
        ROUTE_NAMESPACE_LABEL, ROUTE_NAME_LABEL,
    },
    state::{RouteStatusKey, SharedRouteStatusMap},
};

type Result<T, E = ControllerError> = std::result::Result<T, E>;

/// What one backend object says about the backend service it programs. `reporter` names the
/// object itself, so reports from several objects on one service are kept apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendReport {
    pub service: NamespacedName,
    pub key: RouteStatusKey,
    pub reporter: String,
    pub programmed: bool,
}

/// Reads the report carried by a backend object. Objects without the full label set are not ours.
pub fn backend_report(object: &DynamicObject) -> Option<BackendReport> {
    let labels = object.labels();
    let label = |name: &str| labels.get(name).filter(|value| !value.is_empty());

    let route_kind = label(ROUTE_KIND_LABEL)?;
    let route = NamespacedName::new(label(ROUTE_NAMESPACE_LABEL)?, label(ROUTE_NAME_LABEL)?);
    let gateway = NamespacedName::new(label(GATEWAY_NAMESPACE_LABEL)?, label(GATEWAY_NAME_LABEL)?);
    let service = NamespacedName::new(label(BACKEND_NAMESPACE_LABEL)?, label(BACKEND_NAME_LABEL)?);

    let kind = object.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default();
    let reporter = format!("{kind} {}", NamespacedName::new(&object.namespace().unwrap_or_default(), &object.name_any()));
    let programmed = object.metadata.deletion_timestamp.is_none() && is_programmed(object);
    Some(BackendReport { service, key: RouteStatusKey::new(route_kind, route, gateway), reporter, programmed })
}

fn is_programmed(object: &DynamicObject) -> bool {
    object
        .data
        .get("status")
        .and_then(|status| status.get("conditions"))
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|condition| {
                condition.get("type").and_then(Value::as_str) == Some(PROGRAMMED_CONDITION_TYPE) && condition.get("status").and_then(Value::as_str) == Some(CONDITION_STATUS_TRUE)
            })
        })
}

#[derive(Clone, TypedBuilder)]
pub struct BackendStatusContext {
    shared_status: SharedRouteStatusMap,
}

impl BackendStatusContext {
    pub fn process(&self, object: &DynamicObject) -> Result<Action> {
        let Some(report) = backend_report(object) else {
            debug!("{} {} carries no backend labels", object.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default(), object.name_any());
            return Ok(Action::await_change());
        };
        self.shared_status.report_backend(&report.service, &report.key, &report.reporter, report.programmed)?;
        debug!("{} reports backend {} of {} programmed {}", report.reporter, report.service, report.key, report.programmed);
        Ok(Action::await_change())
    }

    /// Called once the object is gone from the cluster.
    pub fn withdraw(&self, object: &DynamicObject) -> Result<()> {
        if let Some(report) = backend_report(object) {
            self.shared_status.withdraw_backend(&report.service, &report.key, &report.reporter)?;
            debug!("{} withdrawn from backend {} of {}", report.reporter, report.service, report.key);
        }
        Ok(())
    }
}

/// Watches one kind of backend object and feeds its programmed state into the shared map.
#[derive(TypedBuilder)]
pub struct BackendStatusController {
    client: Client,
    gvk: GroupVersionKind,
    ctx: Arc<BackendStatusContext>,
}

impl BackendStatusController {
    pub fn get_controller(&'_ self) -> BoxFuture<'_, ()> {
        let api_resource = ApiResource::from_gvk(&self.gvk);
        let api = Api::<DynamicObject>::all_with(self.client.clone(), &api_resource);
        let controller = Controller::new_with(api.clone(), Config::default(), api_resource)
            .run(Self::reconcile, Self::error_policy, Arc::clone(&self.ctx))
            .for_each(|_| futures::future::ready(()));

        let deletions = watcher::watcher(api, Config::default()).default_backoff().for_each(|event| {
            match event {
                Ok(watcher::Event::Delete(object)) => {
                    if let Err(e) = self.ctx.withdraw(&object) {
                        warn!("Can't withdraw deleted {} {e}", object.name_any());
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("{} watch failed {e}", self.gvk.kind),
            }
            futures::future::ready(())
        });

        futures::future::join(controller, deletions).map(|_| ()).boxed()
    }

    #[allow(clippy::needless_pass_by_value)]
    fn error_policy(_object: Arc<DynamicObject>, err: &ControllerError, _ctx: Arc<BackendStatusContext>) -> Action {
        warn!("Backend status reconcile failed {err}");
        Action::requeue(RECONCILE_ERROR_WAIT)
    }

    async fn reconcile(object: Arc<DynamicObject>, ctx: Arc<BackendStatusContext>) -> Result<Action> {
        let span = span!(Level::DEBUG, "BackendStatusController", id = %object.name_any());
        async move { ctx.process(&object) }.instrument(span).await
    }
}
