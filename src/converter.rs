use std::sync::Arc;

use async_trait::async_trait;
use gateway_api::apis::standard::{grpcroutes::GRPCRoute, httproutes::HTTPRoute};
use kube::api::{DynamicObject, GroupVersionKind};
use typed_builder::TypedBuilder;

use crate::{
    common::RootObject,
    controllers::{status::RouteStatusUpdater, ControllerError},
};

/// Translates one route into the proxy objects that implement it.
///
/// `translate` must only read from the cluster; everything it decides to emit is returned by
/// `output_store` and written by the reconciler.
#[async_trait]
pub trait ApiConverter<R: RootObject>: Send + Sync {
    async fn translate(&mut self) -> Result<(), ControllerError>;

    fn output_store(&self) -> Vec<DynamicObject>;

    /// Every kind this converter may ever emit. Garbage collection is scoped to these.
    fn expected_gvks(&self) -> Vec<GroupVersionKind>;

    fn root_object(&self) -> &R;

    /// Returns `true` when the reconcile should stop here.
    async fn update_root_object_status(&mut self, updater: &RouteStatusUpdater<'_>) -> Result<bool, ControllerError> {
        let expected_gvks = self.expected_gvks();
        updater.update(self.root_object(), &expected_gvks).await
    }
}

pub trait ConverterFactory<R: RootObject>: Send + Sync {
    fn converter(&self, route: Arc<R>) -> Box<dyn ApiConverter<R>>;
}

/// Converter factories per supported route kind.
#[derive(Clone, Default, TypedBuilder)]
pub struct ConverterRegistry {
    #[builder(default, setter(strip_option))]
    http_route: Option<Arc<dyn ConverterFactory<HTTPRoute>>>,
    #[builder(default, setter(strip_option))]
    grpc_route: Option<Arc<dyn ConverterFactory<GRPCRoute>>>,
}

impl ConverterRegistry {
    pub fn http_route(&self) -> Option<Arc<dyn ConverterFactory<HTTPRoute>>> {
        self.http_route.as_ref().map(Arc::clone)
    }

    pub fn grpc_route(&self) -> Option<Arc<dyn ConverterFactory<GRPCRoute>>> {
        self.grpc_route.as_ref().map(Arc::clone)
    }
}

/// Kinds a route kind's converter emits, empty when no converter is registered.
pub fn expected_gvks_of<R: RootObject>(factory: Option<&Arc<dyn ConverterFactory<R>>>, route: Arc<R>) -> Vec<GroupVersionKind> {
    factory.map(|factory| factory.converter(route).expected_gvks()).unwrap_or_default()
}
