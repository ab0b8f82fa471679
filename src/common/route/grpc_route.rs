use gateway_api::apis::standard::grpcroutes::{GRPCRoute, GRPCRouteParentRefs, GRPCRouteRulesBackendRefs, GRPCRouteStatusParentsParentRef};

use super::{BackendReference, ParentReference, RootObject, RouteParentStatus};

impl From<&GRPCRouteParentRefs> for ParentReference {
    fn from(parent: &GRPCRouteParentRefs) -> Self {
        Self {
            group: parent.group.clone(),
            kind: parent.kind.clone(),
            namespace: parent.namespace.clone(),
            name: parent.name.clone(),
            section_name: parent.section_name.clone(),
            port: parent.port,
        }
    }
}

impl From<&GRPCRouteStatusParentsParentRef> for ParentReference {
    fn from(parent: &GRPCRouteStatusParentsParentRef) -> Self {
        Self {
            group: parent.group.clone(),
            kind: parent.kind.clone(),
            namespace: parent.namespace.clone(),
            name: parent.name.clone(),
            section_name: parent.section_name.clone(),
            port: parent.port,
        }
    }
}

impl From<&GRPCRouteRulesBackendRefs> for BackendReference {
    fn from(backend: &GRPCRouteRulesBackendRefs) -> Self {
        Self {
            group: backend.group.clone(),
            kind: backend.kind.clone(),
            namespace: backend.namespace.clone(),
            name: backend.name.clone(),
            port: backend.port,
        }
    }
}

impl RootObject for GRPCRoute {
    fn parent_refs(&self) -> Vec<ParentReference> {
        self.spec.parent_refs.iter().flatten().map(ParentReference::from).collect()
    }

    fn hostnames(&self) -> Vec<String> {
        self.spec.hostnames.clone().unwrap_or_default()
    }

    fn backend_refs(&self) -> Vec<BackendReference> {
        self.spec.rules.iter().flatten().flat_map(|rule| rule.backend_refs.iter().flatten()).map(BackendReference::from).collect()
    }

    fn parent_statuses(&self) -> Vec<RouteParentStatus> {
        self.status
            .iter()
            .flat_map(|status| status.parents.iter())
            .map(|parent| RouteParentStatus {
                parent_ref: ParentReference::from(&parent.parent_ref),
                controller_name: parent.controller_name.clone(),
                conditions: parent.conditions.clone().unwrap_or_default(),
            })
            .collect()
    }
}
