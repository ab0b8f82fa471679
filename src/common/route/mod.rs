pub mod grpc_route;
pub mod http_route;

use std::fmt::Debug;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::Resource;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{normalize_core_group, ResourceKey, DEFAULT_GROUP_NAME, DEFAULT_KIND_NAME, SERVICE_KIND_NAME};

/// A route's reference to the Gateway (and optionally one of its listeners) it attaches to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

impl ParentReference {
    pub fn gateway_key(&self, route_namespace: &str) -> ResourceKey {
        ResourceKey {
            group: self.group.clone().unwrap_or(DEFAULT_GROUP_NAME.to_owned()),
            namespace: self.namespace.clone().unwrap_or(route_namespace.to_owned()),
            name: self.name.clone(),
            kind: self.kind.clone().unwrap_or(DEFAULT_KIND_NAME.to_owned()),
        }
    }

    pub fn targets_gateway(&self) -> bool {
        self.group.as_deref().unwrap_or(DEFAULT_GROUP_NAME) == DEFAULT_GROUP_NAME && self.kind.as_deref().unwrap_or(DEFAULT_KIND_NAME) == DEFAULT_KIND_NAME
    }

    /// Compares two references after filling in the defaults, so that an omitted
    /// namespace and the route's own namespace are the same parent.
    pub fn same_parent(&self, other: &ParentReference, route_namespace: &str) -> bool {
        self.gateway_key(route_namespace) == other.gateway_key(route_namespace) && self.section_name == other.section_name && self.port == other.port
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct BackendReference {
    pub group: Option<String>,
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub name: String,
    pub port: Option<i32>,
}

impl BackendReference {
    pub fn resource_key(&self, route_namespace: &str) -> ResourceKey {
        ResourceKey {
            group: normalize_core_group(self.group.as_deref()),
            namespace: self.namespace.clone().unwrap_or(route_namespace.to_owned()),
            name: self.name.clone(),
            kind: self.kind.clone().unwrap_or(SERVICE_KIND_NAME.to_owned()),
        }
    }

    /// Only core Services can be resolved.
    pub fn is_supported_kind(&self) -> bool {
        normalize_core_group(self.group.as_deref()).is_empty() && self.kind.as_deref().unwrap_or(SERVICE_KIND_NAME) == SERVICE_KIND_NAME
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteParentStatus {
    pub parent_ref: ParentReference,
    pub controller_name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// The capabilities the reconcilers need from a route resource.
pub trait RootObject: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn parent_refs(&self) -> Vec<ParentReference>;
    fn hostnames(&self) -> Vec<String>;
    /// Backend references of every rule, in rule order.
    fn backend_refs(&self) -> Vec<BackendReference>;
    fn parent_statuses(&self) -> Vec<RouteParentStatus>;

    fn route_key(&self) -> ResourceKey {
        ResourceKey::from_resource(self)
    }
}

/// Merge patch replacing `status.parents`. The resource version makes the API server
/// reject the patch when someone else updated the route in the meantime.
pub fn status_patch(parents: &[RouteParentStatus], resource_version: Option<&str>) -> serde_json::Value {
    let mut patch = serde_json::json!({ "status": { "parents": parents } });
    if let Some(resource_version) = resource_version {
        patch["metadata"] = serde_json::json!({ "resourceVersion": resource_version });
    }
    patch
}
