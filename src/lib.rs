use std::{sync::Arc, time::Duration};

use futures::{future::BoxFuture, FutureExt};
use gateway_api::apis::standard::{grpcroutes::GRPCRoute, httproutes::HTTPRoute};
use kube::{api::GroupVersionKind, Client};
use tracing::info;
use typed_builder::TypedBuilder;

pub mod common;
pub mod configuration;
pub mod controllers;
pub mod converter;
pub mod services;
pub mod state;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

use common::RootObject;
use configuration::Configuration;
use controllers::{
    backend_status::{BackendStatusContext, BackendStatusController},
    hybrid_gateway::{HybridGatewayContext, HybridGatewayReconciler},
    route_status::{RouteStatusContext, RouteStatusReconciler},
};
use converter::{ConverterFactory, ConverterRegistry};
use services::{ClusterClient, KubeClusterClient};
use state::SharedRouteStatusMap;

type ControllerTask = BoxFuture<'static, Result<()>>;

#[derive(TypedBuilder)]
struct ControllerTasks {
    client: Client,
    cluster_client: Arc<dyn ClusterClient>,
    shared_status: SharedRouteStatusMap,
    controller_name: String,
    gateway_controller_name: String,
    field_manager: String,
    enable_reference_grants: bool,
    status_requeue: Duration,
}

impl ControllerTasks {
    fn hybrid_gateway<R: RootObject>(&self, factory: Arc<dyn ConverterFactory<R>>) -> ControllerTask {
        let reconciler = HybridGatewayReconciler::builder()
            .client(self.client.clone())
            .ctx(Arc::new(
                HybridGatewayContext::builder()
                    .controller_name(self.controller_name.clone())
                    .gateway_controller_name(self.gateway_controller_name.clone())
                    .field_manager(self.field_manager.clone())
                    .enable_reference_grants(self.enable_reference_grants)
                    .client(Arc::clone(&self.cluster_client))
                    .shared_status(self.shared_status.clone())
                    .factory(factory)
                    .build(),
            ))
            .build();
        async move {
            let kind = R::kind(&());
            info!("{kind} hybrid gateway controller...started");
            reconciler.get_controller().await;
            info!("{kind} hybrid gateway controller...stopped");
            crate::Result::<()>::Ok(())
        }
        .boxed()
    }

    fn route_status<R: RootObject>(&self, factory: Option<Arc<dyn ConverterFactory<R>>>) -> ControllerTask {
        let ctx = RouteStatusContext::builder()
            .controller_name(self.controller_name.clone())
            .gateway_controller_name(self.gateway_controller_name.clone())
            .enable_reference_grants(self.enable_reference_grants)
            .client(Arc::clone(&self.cluster_client))
            .shared_status(self.shared_status.clone())
            .status_requeue(self.status_requeue);
        let ctx = match factory {
            Some(factory) => ctx.factory(factory).build(),
            None => ctx.build(),
        };
        let reconciler = RouteStatusReconciler::builder().client(self.client.clone()).ctx(Arc::new(ctx)).build();
        async move {
            let kind = R::kind(&());
            info!("{kind} status controller...started");
            reconciler.get_controller().await;
            info!("{kind} status controller...stopped");
            crate::Result::<()>::Ok(())
        }
        .boxed()
    }

    fn backend_status(&self, gvk: GroupVersionKind) -> ControllerTask {
        let controller = BackendStatusController::builder()
            .client(self.client.clone())
            .gvk(gvk)
            .ctx(Arc::new(BackendStatusContext::builder().shared_status(self.shared_status.clone()).build()))
            .build();
        async move {
            info!("Backend status controller...started");
            controller.get_controller().await;
            info!("Backend status controller...stopped");
            crate::Result::<()>::Ok(())
        }
        .boxed()
    }
}

/// Runs every controller until they all stop. Hybrid gateway reconcilers are only started for
/// route kinds with a registered converter.
pub async fn start(configuration: Configuration, registry: ConverterRegistry) -> Result<()> {
    info!("Hybrid gateway started");
    let client = Client::try_default().await?;
    let tasks = ControllerTasks::builder()
        .cluster_client(Arc::new(KubeClusterClient::new(client.clone())))
        .client(client)
        .shared_status(SharedRouteStatusMap::new())
        .controller_name(configuration.controller_name.clone())
        .gateway_controller_name(configuration.gateway_controller_name.clone())
        .field_manager(configuration.field_manager.clone())
        .enable_reference_grants(configuration.enable_reference_grants)
        .status_requeue(configuration.status_requeue())
        .build();

    let mut controllers: Vec<ControllerTask> = configuration.backend_kinds.iter().map(|backend_kind| tasks.backend_status(backend_kind.into())).collect();
    controllers.push(tasks.route_status::<HTTPRoute>(registry.http_route()));
    controllers.push(tasks.route_status::<GRPCRoute>(registry.grpc_route()));
    if let Some(factory) = registry.http_route() {
        controllers.push(tasks.hybrid_gateway(factory));
    }
    if let Some(factory) = registry.grpc_route() {
        controllers.push(tasks.hybrid_gateway(factory));
    }

    futures::future::join_all(controllers).await;
    info!("Hybrid gateway stopped");
    Ok(())
}
