use gateway_api::apis::standard::httproutes::{HTTPRoute, HTTPRouteParentRefs, HTTPRouteRulesBackendRefs, HTTPRouteStatusParentsParentRef};

use super::{BackendReference, ParentReference, RootObject, RouteParentStatus};

impl From<&HTTPRouteParentRefs> for ParentReference {
    fn from(parent: &HTTPRouteParentRefs) -> Self {
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

impl From<&HTTPRouteStatusParentsParentRef> for ParentReference {
    fn from(parent: &HTTPRouteStatusParentsParentRef) -> Self {
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

impl From<&HTTPRouteRulesBackendRefs> for BackendReference {
    fn from(backend: &HTTPRouteRulesBackendRefs) -> Self {
        Self {
            group: backend.group.clone(),
            kind: backend.kind.clone(),
            namespace: backend.namespace.clone(),
            name: backend.name.clone(),
            port: backend.port,
        }
    }
}

impl RootObject for HTTPRoute {
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
