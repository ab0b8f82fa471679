use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt, StreamExt};
use kube::{
    api::DynamicObject,
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, Resource,
};
use tracing::{debug, info, span, warn, Instrument, Level};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::{status::RouteStatusUpdater, ControllerError, RECONCILE_ERROR_WAIT, RECONCILE_LONG_WAIT, RECONCILE_SHORT_WAIT};
use crate::{
    common::{stamp_ownership, RootObject},
    converter::ConverterFactory,
    services::{ClusterClient, OrphanCollector, StateEnforcer},
    state::SharedRouteStatusMap,
};

type Result<T, E = ControllerError> = std::result::Result<T, E>;

#[derive(TypedBuilder)]
pub struct HybridGatewayContext<R: RootObject> {
    controller_name: String,
    gateway_controller_name: String,
    field_manager: String,
    #[builder(default = true)]
    enable_reference_grants: bool,
    client: Arc<dyn ClusterClient>,
    shared_status: SharedRouteStatusMap,
    factory: Arc<dyn ConverterFactory<R>>,
}

/// Keeps the proxy objects of one route kind in line with the routes.
#[derive(TypedBuilder)]
pub struct HybridGatewayReconciler<R: RootObject> {
    client: Client,
    ctx: Arc<HybridGatewayContext<R>>,
}

impl<R: RootObject> HybridGatewayReconciler<R> {
    pub fn get_controller(&'_ self) -> BoxFuture<'_, ()> {
        Controller::new(Api::<R>::all(self.client.clone()), Config::default())
            .run(Self::reconcile, Self::error_policy, Arc::clone(&self.ctx))
            .for_each(|_| futures::future::ready(()))
            .boxed()
    }

    #[allow(clippy::needless_pass_by_value)]
    fn error_policy(_object: Arc<R>, err: &ControllerError, _ctx: Arc<HybridGatewayContext<R>>) -> Action {
        if err.is_conflict() {
            Action::requeue(RECONCILE_SHORT_WAIT)
        } else {
            warn!("Reconcile failed {err}");
            Action::requeue(RECONCILE_ERROR_WAIT)
        }
    }

    async fn reconcile(resource: Arc<R>, ctx: Arc<HybridGatewayContext<R>>) -> Result<Action> {
        let Some(maybe_id) = resource.meta().uid.clone() else {
            return Err(ControllerError::InvalidPayload("Uid must be present".to_owned()));
        };

        let Ok(_) = Uuid::parse_str(&maybe_id) else {
            return Err(ControllerError::InvalidPayload("Uid in wrong format".to_owned()));
        };

        let route_key = resource.route_key();
        let span = span!(Level::INFO, "HybridGatewayReconciler", kind = %route_key.kind, id = %route_key);
        ctx.process(resource).instrument(span).await
    }
}

impl<R: RootObject> HybridGatewayContext<R> {
    /// One pass over a route: status, translation, enforcement and garbage collection, in that order.
    pub async fn process(&self, route: Arc<R>) -> Result<Action> {
        let route_key = route.route_key();
        if route.meta().deletion_timestamp.is_some() {
            debug!("Route {route_key} is being deleted");
            return Ok(Action::await_change());
        }

        let mut converter = self.factory.converter(Arc::clone(&route));
        if converter.root_object().meta().uid != route.meta().uid {
            return Err(ControllerError::TypeMismatch(format!("converter for {} {route_key} was built for another object", route_key.kind)));
        }

        let updater = RouteStatusUpdater::builder()
            .client(&*self.client)
            .controller_name(&self.controller_name)
            .gateway_controller_name(&self.gateway_controller_name)
            .enable_reference_grants(self.enable_reference_grants)
            .shared_status(&self.shared_status)
            .build();
        if converter.update_root_object_status(&updater).await? {
            debug!("Status of {route_key} updated, continuing on the next reconcile");
            return Ok(Action::requeue(RECONCILE_SHORT_WAIT));
        }

        converter.translate().await?;
        let owner = route.controller_owner_ref(&());
        let desired: Vec<DynamicObject> = converter
            .output_store()
            .into_iter()
            .map(|mut object| {
                stamp_ownership(&mut object, &route_key, owner.as_ref());
                object
            })
            .collect();

        let outcome = StateEnforcer::builder().client(&*self.client).field_manager(&self.field_manager).build().enforce(&desired).await?;
        let deleted = OrphanCollector::builder().client(&*self.client).route_key(&route_key).build().clean(&desired, &converter.expected_gvks()).await?;

        info!(
            "Reconciled {} {route_key} desired {} applied {} skipped {} deleted {deleted}",
            route_key.kind,
            desired.len(),
            outcome.applied,
            outcome.skipped_deleting
        );
        Ok(Action::requeue(RECONCILE_LONG_WAIT))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use gateway_api::apis::standard::httproutes::HTTPRoute;
    use kube::{api::GroupVersionKind, ResourceExt};
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        common::{find_condition, ROUTE_NAME_LABEL},
        converter::ApiConverter,
        services::{fake::FakeClusterClient, to_typed},
    };

    const CONTROLLER_NAME: &str = "hybrid-gateway.io/route-controller";
    const GATEWAY_CONTROLLER_NAME: &str = "hybrid-gateway.io/gateway-controller";
    const FIELD_MANAGER: &str = "hybrid-gateway";
    const KONG_API_VERSION: &str = "configuration.konghq.com/v1alpha1";

    struct KongRouteConverter {
        route: Arc<HTTPRoute>,
        names: Vec<String>,
        namespaced: bool,
        output: Vec<DynamicObject>,
    }

    #[async_trait]
    impl ApiConverter<HTTPRoute> for KongRouteConverter {
        async fn translate(&mut self) -> Result<(), ControllerError> {
            let namespace = if self.namespaced { json!(self.route.namespace()) } else { Value::Null };
            self.output = self
                .names
                .iter()
                .map(|name| {
                    serde_json::from_value(json!({
                        "apiVersion": KONG_API_VERSION,
                        "kind": "KongRoute",
                        "metadata": { "name": name, "namespace": namespace },
                        "spec": { "paths": ["/echo"], "protocols": ["http"] }
                    }))
                    .unwrap()
                })
                .collect();
            Ok(())
        }

        fn output_store(&self) -> Vec<DynamicObject> {
            self.output.clone()
        }

        fn expected_gvks(&self) -> Vec<GroupVersionKind> {
            vec![GroupVersionKind::gvk("configuration.konghq.com", "v1alpha1", "KongRoute")]
        }

        fn root_object(&self) -> &HTTPRoute {
            &self.route
        }
    }

    struct KongRouteFactory {
        names: Mutex<Vec<String>>,
        namespaced: bool,
        other_root: Option<Arc<HTTPRoute>>,
    }

    impl KongRouteFactory {
        fn emitting(names: &[&str]) -> Self {
            Self { names: Mutex::new(names.iter().map(|name| (*name).to_owned()).collect()), namespaced: true, other_root: None }
        }
    }

    impl ConverterFactory<HTTPRoute> for KongRouteFactory {
        fn converter(&self, route: Arc<HTTPRoute>) -> Box<dyn ApiConverter<HTTPRoute>> {
            let route = self.other_root.as_ref().map_or(route, Arc::clone);
            Box::new(KongRouteConverter { route, names: self.names.lock().unwrap().clone(), namespaced: self.namespaced, output: vec![] })
        }
    }

    fn route(uid: &str) -> Value {
        json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "HTTPRoute",
            "metadata": { "name": "echo", "namespace": "apps", "generation": 1, "resourceVersion": "1", "uid": uid },
            "spec": { "parentRefs": [{ "name": "public", "namespace": "infra" }], "rules": [{ "backendRefs": [] }] }
        })
    }

    fn cluster() -> Arc<FakeClusterClient> {
        Arc::new(FakeClusterClient::with_objects([route("6f1c3a5e-2a57-4d6e-9c1f-3f5b1a9e7c11")]))
    }

    fn context(client: &Arc<FakeClusterClient>, factory: &Arc<KongRouteFactory>) -> HybridGatewayContext<HTTPRoute> {
        HybridGatewayContext::builder()
            .controller_name(CONTROLLER_NAME.to_owned())
            .gateway_controller_name(GATEWAY_CONTROLLER_NAME.to_owned())
            .field_manager(FIELD_MANAGER.to_owned())
            .client(Arc::clone(client) as Arc<dyn ClusterClient>)
            .shared_status(SharedRouteStatusMap::new())
            .factory(Arc::clone(factory) as Arc<dyn ConverterFactory<HTTPRoute>>)
            .build()
    }

    fn stored_route(client: &FakeClusterClient) -> Arc<HTTPRoute> {
        let object = client.object("gateway.networking.k8s.io/v1", "HTTPRoute", Some("apps"), "echo").unwrap();
        Arc::new(to_typed(&object).unwrap())
    }

    fn kong_route_names(client: &FakeClusterClient) -> Vec<String> {
        client.objects_of_kind("KongRoute").iter().map(ResourceExt::name_any).collect()
    }

    #[tokio::test]
    async fn stages_run_in_order_until_stable() {
        let client = cluster();
        let factory = Arc::new(KongRouteFactory::emitting(&["echo-a", "echo-b"]));
        let ctx = context(&client, &factory);

        let action = ctx.process(stored_route(&client)).await.unwrap();
        assert_eq!(action, Action::requeue(RECONCILE_SHORT_WAIT));
        assert_eq!(client.status_patches().len(), 1);
        assert_eq!(client.apply_count(), 0);

        let action = ctx.process(stored_route(&client)).await.unwrap();
        assert_eq!(action, Action::requeue(RECONCILE_LONG_WAIT));
        assert_eq!(client.status_patches().len(), 1);
        assert_eq!(client.apply_count(), 2);
        assert_eq!(kong_route_names(&client), vec!["echo-a".to_owned(), "echo-b".to_owned()]);

        let action = ctx.process(stored_route(&client)).await.unwrap();
        assert_eq!(action, Action::requeue(RECONCILE_SHORT_WAIT));
        let route = stored_route(&client);
        let parents = route.parent_statuses();
        let kong_routes = find_condition(&parents[0].conditions, "KongRouteProgrammed").unwrap();
        assert_eq!((kong_routes.status.as_str(), kong_routes.reason.as_str()), ("False", "NotProgrammed"));

        let action = ctx.process(route).await.unwrap();
        assert_eq!(action, Action::requeue(RECONCILE_LONG_WAIT));
        assert_eq!(client.status_patches().len(), 2);
        assert_eq!(client.apply_count(), 2);
    }

    #[tokio::test]
    async fn emitted_objects_carry_ownership() {
        let client = cluster();
        let factory = Arc::new(KongRouteFactory::emitting(&["echo-a"]));
        let ctx = context(&client, &factory);
        ctx.process(stored_route(&client)).await.unwrap();
        ctx.process(stored_route(&client)).await.unwrap();

        let object = client.object(KONG_API_VERSION, "KongRoute", Some("apps"), "echo-a").unwrap();
        assert_eq!(object.labels().get(ROUTE_NAME_LABEL).map(String::as_str), Some("echo"));
        let owner = &object.owner_references()[0];
        assert_eq!((owner.kind.as_str(), owner.name.as_str(), owner.controller), ("HTTPRoute", "echo", Some(true)));
    }

    #[tokio::test]
    async fn objects_without_namespace_are_placed_with_the_route() {
        let client = cluster();
        let factory = Arc::new(KongRouteFactory { namespaced: false, ..KongRouteFactory::emitting(&["echo-a"]) });
        let ctx = context(&client, &factory);
        ctx.process(stored_route(&client)).await.unwrap();
        ctx.process(stored_route(&client)).await.unwrap();

        let object = client.object(KONG_API_VERSION, "KongRoute", Some("apps"), "echo-a").unwrap();
        assert_eq!(object.owner_references().len(), 1);
        assert_eq!(client.apply_count(), 1);
        assert_eq!(client.delete_count(), 0);
    }

    #[tokio::test]
    async fn objects_no_longer_emitted_are_collected() {
        let client = cluster();
        let factory = Arc::new(KongRouteFactory::emitting(&["echo-a", "echo-b"]));
        let ctx = context(&client, &factory);
        ctx.process(stored_route(&client)).await.unwrap();
        ctx.process(stored_route(&client)).await.unwrap();
        ctx.process(stored_route(&client)).await.unwrap();

        *factory.names.lock().unwrap() = vec!["echo-b".to_owned()];
        ctx.process(stored_route(&client)).await.unwrap();
        assert_eq!(kong_route_names(&client), vec!["echo-b".to_owned()]);
        assert_eq!(client.delete_count(), 1);
    }

    #[tokio::test]
    async fn deleting_routes_are_left_alone() {
        let client = cluster();
        let factory = Arc::new(KongRouteFactory::emitting(&["echo-a"]));
        let ctx = context(&client, &factory);
        let mut route = (*stored_route(&client)).clone();
        route.metadata.deletion_timestamp = serde_json::from_value(json!("2024-01-01T00:00:00Z")).unwrap();

        let action = ctx.process(Arc::new(route)).await.unwrap();
        assert_eq!(action, Action::await_change());
        assert!(client.status_patches().is_empty());
        assert_eq!(client.apply_count(), 0);
    }

    #[tokio::test]
    async fn apply_conflicts_requeue_quickly() {
        let client = cluster();
        let factory = Arc::new(KongRouteFactory::emitting(&["echo-a"]));
        let ctx = Arc::new(context(&client, &factory));
        ctx.process(stored_route(&client)).await.unwrap();

        client.conflict_on_apply(true);
        let err = ctx.process(stored_route(&client)).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(HybridGatewayReconciler::error_policy(stored_route(&client), &err, Arc::clone(&ctx)), Action::requeue(RECONCILE_SHORT_WAIT));
        assert_eq!(
            HybridGatewayReconciler::error_policy(stored_route(&client), &ControllerError::InvalidSelector("bad".to_owned()), ctx),
            Action::requeue(RECONCILE_ERROR_WAIT)
        );
    }

    #[tokio::test]
    async fn converter_for_another_route_is_rejected() {
        let client = cluster();
        let other: HTTPRoute = serde_json::from_value(route("0b7e2a44-9d1c-4f7e-8a55-2c9e1f3d4b60")).unwrap();
        let factory = Arc::new(KongRouteFactory { other_root: Some(Arc::new(other)), ..KongRouteFactory::emitting(&["echo-a"]) });
        let ctx = context(&client, &factory);

        let err = ctx.process(stored_route(&client)).await.unwrap_err();
        assert!(matches!(err, ControllerError::TypeMismatch(_)));
        assert_eq!(client.apply_count(), 0);
    }
}
