use std::{sync::Arc, time::Duration};

use futures::{future::BoxFuture, FutureExt, StreamExt};
use kube::{
    runtime::{
        controller::Action,
        watcher::{self, Config},
        Controller, WatchStreamExt,
    },
    Api, Client, Resource,
};
use tracing::{debug, span, warn, Instrument, Level};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::{status::RouteStatusUpdater, ControllerError, RECONCILE_ERROR_WAIT, RECONCILE_SHORT_WAIT};
use crate::{
    common::RootObject,
    converter::{expected_gvks_of, ConverterFactory},
    services::ClusterClient,
    state::SharedRouteStatusMap,
};

type Result<T, E = ControllerError> = std::result::Result<T, E>;

#[derive(TypedBuilder)]
pub struct RouteStatusContext<R: RootObject> {
    controller_name: String,
    gateway_controller_name: String,
    #[builder(default = true)]
    enable_reference_grants: bool,
    client: Arc<dyn ClusterClient>,
    shared_status: SharedRouteStatusMap,
    #[builder(default, setter(strip_option))]
    factory: Option<Arc<dyn ConverterFactory<R>>>,
    status_requeue: Duration,
}

/// Recomputes route statuses periodically. Backend reports land in the shared map without
/// producing watch events, so routes are requeued on a timer. Deleted routes are seen through a
/// separate watch since they never reach the reconciler.
#[derive(TypedBuilder)]
pub struct RouteStatusReconciler<R: RootObject> {
    client: Client,
    ctx: Arc<RouteStatusContext<R>>,
}

impl<R: RootObject> RouteStatusReconciler<R> {
    pub fn get_controller(&'_ self) -> BoxFuture<'_, ()> {
        let controller = Controller::new(Api::<R>::all(self.client.clone()), Config::default())
            .run(Self::reconcile, Self::error_policy, Arc::clone(&self.ctx))
            .for_each(|_| futures::future::ready(()));

        let deletions = watcher::watcher(Api::<R>::all(self.client.clone()), Config::default()).default_backoff().for_each(|event| {
            match event {
                Ok(watcher::Event::Delete(route)) => {
                    if let Err(e) = self.ctx.forget(&route) {
                        warn!("Can't forget deleted route {} {e}", route.route_key());
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Route watch failed {e}"),
            }
            futures::future::ready(())
        });

        futures::future::join(controller, deletions).map(|_| ()).boxed()
    }

    #[allow(clippy::needless_pass_by_value)]
    fn error_policy(_object: Arc<R>, err: &ControllerError, _ctx: Arc<RouteStatusContext<R>>) -> Action {
        if err.is_conflict() {
            Action::requeue(RECONCILE_SHORT_WAIT)
        } else {
            warn!("Status reconcile failed {err}");
            Action::requeue(RECONCILE_ERROR_WAIT)
        }
    }

    async fn reconcile(resource: Arc<R>, ctx: Arc<RouteStatusContext<R>>) -> Result<Action> {
        let Some(maybe_id) = resource.meta().uid.clone() else {
            return Err(ControllerError::InvalidPayload("Uid must be present".to_owned()));
        };

        let Ok(_) = Uuid::parse_str(&maybe_id) else {
            return Err(ControllerError::InvalidPayload("Uid in wrong format".to_owned()));
        };

        let route_key = resource.route_key();
        let span = span!(Level::INFO, "RouteStatusReconciler", kind = %route_key.kind, id = %route_key);
        ctx.process(resource).instrument(span).await
    }
}

impl<R: RootObject> RouteStatusContext<R> {
    /// Drops everything the shared map holds for the route, whichever gateways it was attached to.
    pub fn forget(&self, route: &R) -> Result<()> {
        let route_key = route.route_key();
        let forgotten = self.shared_status.remove_routes_for(&route_key.kind, &route_key.namespaced_name())?;
        debug!("Route {route_key} is gone, forgot {forgotten} gateways");
        Ok(())
    }

    pub async fn process(&self, route: Arc<R>) -> Result<Action> {
        let route_key = route.route_key();
        if route.meta().deletion_timestamp.is_some() {
            self.forget(&route)?;
            return Ok(Action::await_change());
        }

        let output_gvks = expected_gvks_of(self.factory.as_ref(), Arc::clone(&route));
        let patched = RouteStatusUpdater::builder()
            .client(&*self.client)
            .controller_name(&self.controller_name)
            .gateway_controller_name(&self.gateway_controller_name)
            .enable_reference_grants(self.enable_reference_grants)
            .shared_status(&self.shared_status)
            .build()
            .update(&*route, &output_gvks)
            .await?;
        debug!("Status of {route_key} checked, patched {patched}");
        Ok(Action::requeue(self.status_requeue))
    }
}
