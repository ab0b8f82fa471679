use std::collections::BTreeMap;

use gateway_api::apis::standard::gateways::{Gateway, GatewayListeners, GatewayListenersAllowedRoutesNamespaces, GatewayListenersAllowedRoutesNamespacesFrom};
use kube::ResourceExt;
use tracing::debug;
use typed_builder::TypedBuilder;

use super::{HostnameMatchFilter, LabelSelectorMatcher};
use crate::{
    common::{is_condition_true, ParentReference, ResourceKey, RouteConditionReason, DEFAULT_GROUP_NAME, PROGRAMMED_CONDITION_TYPE},
    controllers::ControllerError,
};

/// Result of attaching a route to the listeners of one Gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenerMatch {
    Accepted(Vec<String>),
    NoMatchingParent,
    NotAllowedByListeners,
    NoMatchingListenerHostname,
}

impl ListenerMatch {
    pub fn reason(&self) -> RouteConditionReason {
        match self {
            ListenerMatch::Accepted(_) => RouteConditionReason::Accepted,
            ListenerMatch::NoMatchingParent => RouteConditionReason::NoMatchingParent,
            ListenerMatch::NotAllowedByListeners => RouteConditionReason::NotAllowedByListeners,
            ListenerMatch::NoMatchingListenerHostname => RouteConditionReason::NoMatchingListenerHostname,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ListenerMatch::Accepted(listeners) => format!("Route is accepted by listeners {}", listeners.join(",")),
            ListenerMatch::NoMatchingParent => "No ready listener matches the parent reference".to_owned(),
            ListenerMatch::NotAllowedByListeners => "Route is not allowed by any listener".to_owned(),
            ListenerMatch::NoMatchingListenerHostname => "No listener hostname matches the route hostnames".to_owned(),
        }
    }
}

#[derive(TypedBuilder)]
pub struct RouteListenerMatcher<'a> {
    gateway: &'a Gateway,
    route_key: &'a ResourceKey,
    route_hostnames: &'a [String],
    /// Labels of the route's namespace, used by selector based policies.
    namespace_labels: &'a BTreeMap<String, String>,
}

impl RouteListenerMatcher<'_> {
    pub fn match_parent(&self, parent: &ParentReference) -> Result<ListenerMatch, ControllerError> {
        let listeners: Vec<&GatewayListeners> = self
            .gateway
            .spec
            .listeners
            .iter()
            .filter(|listener| parent.section_name.as_ref().map_or(true, |section_name| listener.name == *section_name))
            .filter(|listener| parent.port.map_or(true, |port| listener.port == port))
            .filter(|listener| self.is_programmed(&listener.name))
            .collect();
        debug!("Listeners matching {parent:?} {:?}", listeners.iter().map(|l| &l.name).collect::<Vec<_>>());
        if listeners.is_empty() {
            return Ok(ListenerMatch::NoMatchingParent);
        }

        let mut allowed = vec![];
        for listener in listeners {
            if self.is_allowed(listener)? {
                allowed.push(listener);
            }
        }
        if allowed.is_empty() {
            return Ok(ListenerMatch::NotAllowedByListeners);
        }

        let matching: Vec<String> = allowed
            .into_iter()
            .filter(|listener| HostnameMatchFilter::new(listener.hostname.as_deref().unwrap_or_default(), self.route_hostnames).filter())
            .map(|listener| listener.name.clone())
            .collect();
        if matching.is_empty() {
            return Ok(ListenerMatch::NoMatchingListenerHostname);
        }

        Ok(ListenerMatch::Accepted(matching))
    }

    fn is_programmed(&self, listener_name: &str) -> bool {
        self.gateway
            .status
            .as_ref()
            .and_then(|status| status.listeners.as_ref())
            .and_then(|listeners| listeners.iter().find(|listener| listener.name == listener_name))
            .is_some_and(|listener| is_condition_true(&listener.conditions, PROGRAMMED_CONDITION_TYPE))
    }

    fn is_allowed(&self, listener: &GatewayListeners) -> Result<bool, ControllerError> {
        let Some(allowed_routes) = &listener.allowed_routes else {
            return Ok(self.same_namespace());
        };

        if let Some(kinds) = allowed_routes.kinds.as_ref().filter(|kinds| !kinds.is_empty()) {
            let kind_allowed = kinds
                .iter()
                .any(|kind| kind.kind == self.route_key.kind && kind.group.as_deref().unwrap_or(DEFAULT_GROUP_NAME) == self.route_key.group);
            if !kind_allowed {
                return Ok(false);
            }
        }

        match &allowed_routes.namespaces {
            Some(GatewayListenersAllowedRoutesNamespaces { from: Some(from), selector }) => match from {
                GatewayListenersAllowedRoutesNamespacesFrom::All => Ok(true),
                GatewayListenersAllowedRoutesNamespacesFrom::Same => Ok(self.same_namespace()),
                GatewayListenersAllowedRoutesNamespacesFrom::Selector => {
                    let Some(selector) = selector else {
                        return Err(ControllerError::InvalidSelector(format!("listener {} selects namespaces without a selector", listener.name)));
                    };
                    LabelSelectorMatcher::from_serializable(selector)?.matches(self.namespace_labels)
                }
            },
            _ => Ok(self.same_namespace()),
        }
    }

    fn same_namespace(&self) -> bool {
        self.gateway.namespace().unwrap_or_default() == self.route_key.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GATEWAY: &str = r"
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata:
  name: public
  namespace: infra
spec:
  gatewayClassName: hybrid
  listeners:
  - name: http
    port: 80
    protocol: HTTP
    allowedRoutes:
      namespaces:
        from: All
  - name: https
    port: 443
    protocol: HTTPS
    hostname: '*.example.com'
    allowedRoutes:
      namespaces:
        from: Selector
        selector:
          matchLabels:
            exposed: 'true'
  - name: local
    port: 8080
    protocol: HTTP
  - name: grpc-only
    port: 9090
    protocol: HTTP
    allowedRoutes:
      kinds:
      - kind: GRPCRoute
      namespaces:
        from: All
  - name: broken
    port: 9999
    protocol: HTTP
status:
  listeners:
  - name: http
    attachedRoutes: 0
    supportedKinds: []
    conditions:
    - { type: Programmed, status: 'True', reason: Programmed, message: '', lastTransitionTime: '2024-01-01T00:00:00Z' }
  - name: https
    attachedRoutes: 0
    supportedKinds: []
    conditions:
    - { type: Programmed, status: 'True', reason: Programmed, message: '', lastTransitionTime: '2024-01-01T00:00:00Z' }
  - name: local
    attachedRoutes: 0
    supportedKinds: []
    conditions:
    - { type: Programmed, status: 'True', reason: Programmed, message: '', lastTransitionTime: '2024-01-01T00:00:00Z' }
  - name: grpc-only
    attachedRoutes: 0
    supportedKinds: []
    conditions:
    - { type: Programmed, status: 'True', reason: Programmed, message: '', lastTransitionTime: '2024-01-01T00:00:00Z' }
  - name: broken
    attachedRoutes: 0
    supportedKinds: []
    conditions:
    - { type: Programmed, status: 'False', reason: Invalid, message: '', lastTransitionTime: '2024-01-01T00:00:00Z' }
";

    fn gateway() -> Gateway {
        serde_yaml::from_str(GATEWAY).unwrap()
    }

    fn route_key(namespace: &str) -> ResourceKey {
        ResourceKey { group: DEFAULT_GROUP_NAME.to_owned(), namespace: namespace.to_owned(), name: "echo".to_owned(), kind: "HTTPRoute".to_owned() }
    }

    fn parent(section_name: Option<&str>, port: Option<i32>) -> ParentReference {
        ParentReference { name: "public".to_owned(), namespace: Some("infra".to_owned()), section_name: section_name.map(str::to_owned), port, ..Default::default() }
    }

    fn matched(namespace: &str, hostnames: &[String], labels: &BTreeMap<String, String>, parent: &ParentReference) -> ListenerMatch {
        matched_on(&gateway(), namespace, hostnames, labels, parent)
    }

    fn matched_on(gateway: &Gateway, namespace: &str, hostnames: &[String], labels: &BTreeMap<String, String>, parent: &ParentReference) -> ListenerMatch {
        let route_key = route_key(namespace);
        RouteListenerMatcher::builder()
            .gateway(gateway)
            .route_key(&route_key)
            .route_hostnames(hostnames)
            .namespace_labels(labels)
            .build()
            .match_parent(parent)
            .unwrap()
    }

    #[test]
    fn section_and_port_must_all_match_a_ready_listener() {
        let labels = BTreeMap::new();
        assert_eq!(matched("apps", &[], &labels, &parent(Some("http"), Some(80))), ListenerMatch::Accepted(vec!["http".to_owned()]));
        assert_eq!(matched("apps", &[], &labels, &parent(Some("http"), Some(443))), ListenerMatch::NoMatchingParent);
        assert_eq!(matched("apps", &[], &labels, &parent(Some("missing"), None)), ListenerMatch::NoMatchingParent);
        assert_eq!(matched("infra", &[], &labels, &parent(Some("broken"), None)), ListenerMatch::NoMatchingParent);
        assert_eq!(matched("apps", &[], &labels, &parent(None, Some(80))), ListenerMatch::Accepted(vec!["http".to_owned()]));
    }

    #[test]
    fn allowed_routes_policy() {
        let labels = BTreeMap::new();
        assert_eq!(matched("apps", &[], &labels, &parent(Some("local"), None)), ListenerMatch::NotAllowedByListeners);
        assert_eq!(matched("infra", &[], &labels, &parent(Some("local"), None)), ListenerMatch::Accepted(vec!["local".to_owned()]));
        assert_eq!(matched("apps", &[], &labels, &parent(Some("grpc-only"), None)), ListenerMatch::NotAllowedByListeners);
        assert_eq!(matched("apps", &[], &labels, &parent(Some("https"), None)), ListenerMatch::NotAllowedByListeners);

        let exposed = BTreeMap::from([("exposed".to_owned(), "true".to_owned())]);
        assert_eq!(matched("apps", &[], &exposed, &parent(Some("https"), None)), ListenerMatch::Accepted(vec!["https".to_owned()]));
    }

    #[test]
    fn kinds_without_group_default_to_gateway_api() {
        let with_kinds = |kinds: serde_json::Value| {
            let mut gateway = gateway();
            if let Some(allowed_routes) = gateway.spec.listeners[0].allowed_routes.as_mut() {
                allowed_routes.kinds = Some(serde_json::from_value(kinds).unwrap());
            }
            gateway
        };
        let labels = BTreeMap::new();
        let http = parent(Some("http"), None);

        let gateway = with_kinds(serde_json::json!([{ "kind": "HTTPRoute" }]));
        assert_eq!(matched_on(&gateway, "apps", &[], &labels, &http), ListenerMatch::Accepted(vec!["http".to_owned()]));
        let gateway = with_kinds(serde_json::json!([{ "group": "gateway.networking.k8s.io", "kind": "HTTPRoute" }]));
        assert_eq!(matched_on(&gateway, "apps", &[], &labels, &http), ListenerMatch::Accepted(vec!["http".to_owned()]));
        let gateway = with_kinds(serde_json::json!([{ "group": "", "kind": "HTTPRoute" }]));
        assert_eq!(matched_on(&gateway, "apps", &[], &labels, &http), ListenerMatch::NotAllowedByListeners);
    }

    #[test]
    fn hostname_intersection() {
        let exposed = BTreeMap::from([("exposed".to_owned(), "true".to_owned())]);
        let hostnames = vec!["echo.example.org".to_owned()];
        assert_eq!(matched("apps", &hostnames, &exposed, &parent(Some("https"), None)), ListenerMatch::NoMatchingListenerHostname);
        assert_eq!(matched("apps", &hostnames, &exposed, &parent(None, None)), ListenerMatch::Accepted(vec!["http".to_owned()]));

        let hostnames = vec!["echo.example.com".to_owned()];
        assert_eq!(matched("apps", &hostnames, &exposed, &parent(None, None)), ListenerMatch::Accepted(vec!["http".to_owned(), "https".to_owned()]));
    }

    #[test]
    fn selector_without_selector_is_an_error() {
        let mut gateway = gateway();
        if let Some(namespaces) = gateway.spec.listeners[1].allowed_routes.as_mut().and_then(|a| a.namespaces.as_mut()) {
            namespaces.selector = None;
        }
        let route_key = route_key("apps");
        let labels = BTreeMap::new();
        let result = RouteListenerMatcher::builder()
            .gateway(&gateway)
            .route_key(&route_key)
            .route_hostnames(&[])
            .namespace_labels(&labels)
            .build()
            .match_parent(&parent(Some("https"), None));
        assert!(matches!(result, Err(ControllerError::InvalidSelector(_))));
    }
}
