use std::collections::{BTreeMap, BTreeSet};

use gateway_api::apis::standard::{gatewayclasses::GatewayClass, gateways::Gateway, referencegrants::ReferenceGrant};
use k8s_openapi::{api::core::v1::Namespace, apimachinery::pkg::apis::meta::v1::Condition};
use kube::api::GroupVersionKind;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use crate::{
    common::{
        deduplicate_by_severity, find_condition, is_condition_true, merge_conditions, new_condition, ownership_selector, programmed_condition_for_kind, status_patch, NamespacedName,
        ParentReference, ResourceKey, RootObject, RouteConditionReason, RouteConditionType, RouteParentStatus, PROGRAMMED_CONDITION_TYPE,
    },
    controllers::{check_reference_grant, ControllerError, FromResourceKey, ListenerMatch, RouteListenerMatcher, ToResourceKey},
    services::{get_typed, gvk_for, list_typed, ClusterClient},
    state::{RouteStatusKey, SharedRouteStatusMap},
};

/// Computes and writes the per-parent status of one route.
#[derive(TypedBuilder)]
pub struct RouteStatusUpdater<'a> {
    client: &'a dyn ClusterClient,
    controller_name: &'a str,
    gateway_controller_name: &'a str,
    #[builder(default = true)]
    enable_reference_grants: bool,
    shared_status: &'a SharedRouteStatusMap,
}

enum ParentResolution {
    Unmanaged,
    MissingGateway,
    Gateway(Box<Gateway>),
}

impl RouteStatusUpdater<'_> {
    /// Returns whether a status patch was issued.
    pub async fn update<R: RootObject>(&self, route: &R, output_gvks: &[GroupVersionKind]) -> Result<bool, ControllerError> {
        let route_key = route.route_key();
        let parents = self.compute_parent_statuses(route, output_gvks).await?;
        let current = route.parent_statuses();
        if parents == current {
            debug!("Status of {route_key} is up to date");
            return Ok(false);
        }

        let patch = status_patch(&parents, route.meta().resource_version.as_deref());
        self.client
            .patch_status(&gvk_for::<R>(), &route_key.namespace, &route_key.name, &patch)
            .await
            .map_err(|e| ControllerError::client(&route_key.kind, route_key.to_string(), e))?;
        info!("Patched status of {} {route_key} with {} parents", route_key.kind, parents.len());
        Ok(true)
    }

    /// The complete `status.parents` list the route should carry.
    pub async fn compute_parent_statuses<R: RootObject>(&self, route: &R, output_gvks: &[GroupVersionKind]) -> Result<Vec<RouteParentStatus>, ControllerError> {
        let route_key = route.route_key();
        let generation = route.meta().generation;
        let current = route.parent_statuses();

        let mut parent_refs: Vec<ParentReference> = vec![];
        for parent in route.parent_refs() {
            if !parent_refs.iter().any(|p| p.same_parent(&parent, &route_key.namespace)) {
                parent_refs.push(parent);
            }
        }

        let mut computed: Vec<RouteParentStatus> = vec![];
        let mut gateways = BTreeSet::new();
        let mut shared_conditions = None;
        for parent in parent_refs {
            let gateway = match self.resolve_parent(&parent, &route_key).await? {
                ParentResolution::Unmanaged => continue,
                ParentResolution::MissingGateway => None,
                ParentResolution::Gateway(gateway) => Some(gateway),
            };

            let existing = current.iter().find(|status| status.controller_name == self.controller_name && status.parent_ref.same_parent(&parent, &route_key.namespace));
            let existing_conditions = existing.map(|status| status.conditions.as_slice()).unwrap_or_default();

            let accepted = match &gateway {
                Some(gateway) => {
                    let namespace_labels = self.namespace_labels(&route_key.namespace).await?;
                    let listener_match = RouteListenerMatcher::builder()
                        .gateway(gateway)
                        .route_key(&route_key)
                        .route_hostnames(&route.hostnames())
                        .namespace_labels(&namespace_labels)
                        .build()
                        .match_parent(&parent)?;
                    let accepted = matches!(listener_match, ListenerMatch::Accepted(_));
                    new_condition(RouteConditionType::Accepted.to_string(), accepted, listener_match.reason(), listener_match.message(), generation)
                }
                None => {
                    let gateway_key = parent.gateway_key(&route_key.namespace);
                    new_condition(RouteConditionType::Accepted.to_string(), false, RouteConditionReason::NoMatchingParent, format!("Gateway {gateway_key} not found"), generation)
                }
            };

            if shared_conditions.is_none() {
                let mut conditions = vec![self.resolved_refs(route, &route_key, generation).await?];
                conditions.extend(self.programmed_by_kind(&route_key, output_gvks, generation).await?);
                shared_conditions = Some(conditions);
            }

            let mut conditions = vec![accepted];
            conditions.extend(shared_conditions.iter().flatten().cloned());
            let gateway_name = parent.gateway_key(&route_key.namespace).namespaced_name();
            gateways.insert(gateway_name.clone());
            if let Some(backends_programmed) = self.backends_programmed(route, &route_key, gateway_name, existing_conditions, generation)? {
                conditions.push(backends_programmed);
            }

            computed.push(RouteParentStatus {
                parent_ref: parent,
                controller_name: self.controller_name.to_owned(),
                conditions: merge_conditions(existing_conditions, conditions),
            });
        }

        let dropped = self.shared_status.retain_gateways(&route_key.kind, &route_key.namespaced_name(), &gateways)?;
        if dropped > 0 {
            debug!("Forgot {dropped} detached gateways of {route_key}");
        }
        Ok(self.reconcile_parent_entries(&current, computed, &route_key.namespace))
    }

    /// Other controllers' entries stay in place. Our entries are replaced by the computed ones,
    /// or dropped when their parent is no longer managed.
    fn reconcile_parent_entries(&self, current: &[RouteParentStatus], mut computed: Vec<RouteParentStatus>, route_namespace: &str) -> Vec<RouteParentStatus> {
        let mut parents = vec![];
        for status in current {
            if status.controller_name != self.controller_name {
                parents.push(status.clone());
            } else if let Some(index) = computed.iter().position(|c| c.parent_ref.same_parent(&status.parent_ref, route_namespace)) {
                parents.push(computed.remove(index));
            }
        }
        parents.extend(computed);
        parents
    }

    async fn resolve_parent(&self, parent: &ParentReference, route_key: &ResourceKey) -> Result<ParentResolution, ControllerError> {
        if !parent.targets_gateway() {
            return Ok(ParentResolution::Unmanaged);
        }
        let gateway_key = parent.gateway_key(&route_key.namespace);
        let Some(gateway) = get_typed::<Gateway>(self.client, Some(&gateway_key.namespace), &gateway_key.name)
            .await
            .map_err(|e| ControllerError::client("Gateway", gateway_key.to_string(), e))?
        else {
            return Ok(ParentResolution::MissingGateway);
        };

        let class_name = gateway.spec.gateway_class_name.clone();
        let gateway_class = get_typed::<GatewayClass>(self.client, None, &class_name).await.map_err(|e| ControllerError::client("GatewayClass", &class_name, e))?;
        match gateway_class {
            Some(class) if class.spec.controller_name == self.gateway_controller_name => Ok(ParentResolution::Gateway(Box::new(gateway))),
            _ => {
                debug!("Gateway {gateway_key} belongs to another implementation");
                Ok(ParentResolution::Unmanaged)
            }
        }
    }

    async fn namespace_labels(&self, namespace: &str) -> Result<BTreeMap<String, String>, ControllerError> {
        let namespace = get_typed::<Namespace>(self.client, None, namespace).await.map_err(|e| ControllerError::client("Namespace", namespace, e))?;
        Ok(namespace.and_then(|namespace| namespace.metadata.labels).unwrap_or_default())
    }

    /// Checks every backend in rule order and stops at the first problem.
    async fn resolved_refs<R: RootObject>(&self, route: &R, route_key: &ResourceKey, generation: Option<i64>) -> Result<Condition, ControllerError> {
        let resolved_refs = RouteConditionType::ResolvedRefs.to_string();
        let mut grants_by_namespace: BTreeMap<String, Vec<ReferenceGrant>> = BTreeMap::new();

        for backend in route.backend_refs() {
            let backend_key = backend.resource_key(&route_key.namespace);
            if !backend.is_supported_kind() {
                let message = format!("Unsupported backend kind {}/{} for {}", backend.group.unwrap_or_default(), backend_key.kind, backend_key.name);
                return Ok(new_condition(resolved_refs, false, RouteConditionReason::InvalidKind, message, generation));
            }

            let service = self
                .client
                .get(&gvk_for::<k8s_openapi::api::core::v1::Service>(), Some(&backend_key.namespace), &backend_key.name)
                .await
                .map_err(|e| ControllerError::client("Service", backend_key.to_string(), e))?;
            if service.is_none() {
                return Ok(new_condition(resolved_refs, false, RouteConditionReason::BackendNotFound, format!("Backend {backend_key} not found"), generation));
            }

            if backend_key.namespace == route_key.namespace {
                continue;
            }
            if !self.enable_reference_grants {
                let message = format!("Cross namespace reference to {backend_key} is not permitted");
                return Ok(new_condition(resolved_refs, false, RouteConditionReason::RefNotPermitted, message, generation));
            }

            if !grants_by_namespace.contains_key(&backend_key.namespace) {
                let grants = list_typed::<ReferenceGrant>(self.client, Some(&backend_key.namespace), None)
                    .await
                    .map_err(|e| ControllerError::client("ReferenceGrant", &backend_key.namespace, e))?;
                grants_by_namespace.insert(backend_key.namespace.clone(), grants);
            }
            let grants = grants_by_namespace.get(&backend_key.namespace).map(Vec::as_slice).unwrap_or_default();
            if grants.is_empty() {
                let message = format!("No ReferenceGrants found in namespace {}", backend_key.namespace);
                return Ok(new_condition(resolved_refs, false, RouteConditionReason::RefNotPermitted, message, generation));
            }
            if !check_reference_grant(grants, &backend_key.namespace, &FromResourceKey::from(route_key), &ToResourceKey::from(&backend_key)) {
                let message = format!("No ReferenceGrant in namespace {} permits {} {route_key} to reference {backend_key}", backend_key.namespace, route_key.kind);
                return Ok(new_condition(resolved_refs, false, RouteConditionReason::RefNotPermitted, message, generation));
            }
        }

        Ok(new_condition(resolved_refs, true, RouteConditionReason::ResolvedRefs, "All references resolved", generation))
    }

    /// One condition per emitted kind that currently has live objects for this route.
    async fn programmed_by_kind(&self, route_key: &ResourceKey, output_gvks: &[GroupVersionKind], generation: Option<i64>) -> Result<Vec<Condition>, ControllerError> {
        let selector = ownership_selector(route_key);
        let mut conditions = vec![];
        for gvk in output_gvks {
            let objects = self
                .client
                .list(gvk, Some(&route_key.namespace), Some(&selector))
                .await
                .map_err(|e| ControllerError::client(&gvk.kind, &route_key.namespace, e))?;
            if objects.is_empty() {
                continue;
            }
            let programmed = objects.iter().any(|object| {
                object
                    .data
                    .get("status")
                    .and_then(|status| status.get("conditions"))
                    .and_then(|conditions| serde_json::from_value::<Vec<Condition>>(conditions.clone()).ok())
                    .is_some_and(|conditions| is_condition_true(&conditions, PROGRAMMED_CONDITION_TYPE))
            });
            conditions.push(programmed_condition_for_kind(&gvk.kind, programmed, generation));
        }
        Ok(deduplicate_by_severity(conditions))
    }

    /// `None` means the condition must not be written. While any backend has not been reported
    /// yet the previous condition, if there is one, is carried over untouched.
    fn backends_programmed<R: RootObject>(
        &self,
        route: &R,
        route_key: &ResourceKey,
        gateway: NamespacedName,
        existing_conditions: &[Condition],
        generation: Option<i64>,
    ) -> Result<Option<Condition>, ControllerError> {
        let services: BTreeSet<NamespacedName> = route.backend_refs().iter().map(|backend| backend.resource_key(&route_key.namespace).namespaced_name()).collect();
        if services.is_empty() {
            return Ok(None);
        }

        let key = RouteStatusKey::new(&route_key.kind, route_key.namespaced_name(), gateway);
        self.shared_status.init_route(&key, services.iter().cloned())?;

        let mut not_programmed = vec![];
        for service in &services {
            let (programmed_backends, initialized) = self.shared_status.get_programmed_services(&key, service)?;
            if !initialized {
                debug!("Backend {service} of {key} not reported yet");
                return Ok(find_condition(existing_conditions, &RouteConditionType::BackendsProgrammed.to_string()).cloned());
            }
            if programmed_backends != 1 {
                not_programmed.push(service.to_string());
            }
        }

        let backends_programmed = RouteConditionType::BackendsProgrammed.to_string();
        Ok(Some(if not_programmed.is_empty() {
            new_condition(backends_programmed, true, RouteConditionReason::BackendsProgrammed, "All backends are programmed", generation)
        } else {
            new_condition(
                backends_programmed,
                false,
                RouteConditionReason::BackendsNotProgrammed,
                format!("Backends not programmed: {}", not_programmed.join(",")),
                generation,
            )
        }))
    }
}
