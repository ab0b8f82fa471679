use std::collections::BTreeMap;

use itertools::Itertools;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;

use super::ResourceKey;

pub const ROUTE_KIND_LABEL: &str = "hybrid-gateway.io/route-kind";
pub const ROUTE_NAMESPACE_LABEL: &str = "hybrid-gateway.io/route-namespace";
pub const ROUTE_NAME_LABEL: &str = "hybrid-gateway.io/route-name";
pub const GATEWAY_NAMESPACE_LABEL: &str = "hybrid-gateway.io/gateway-namespace";
pub const GATEWAY_NAME_LABEL: &str = "hybrid-gateway.io/gateway-name";
pub const BACKEND_NAMESPACE_LABEL: &str = "hybrid-gateway.io/backend-namespace";
pub const BACKEND_NAME_LABEL: &str = "hybrid-gateway.io/backend-name";

pub fn ownership_labels(route_key: &ResourceKey) -> BTreeMap<String, String> {
    BTreeMap::from([
        (ROUTE_KIND_LABEL.to_owned(), route_key.kind.clone()),
        (ROUTE_NAMESPACE_LABEL.to_owned(), route_key.namespace.clone()),
        (ROUTE_NAME_LABEL.to_owned(), route_key.name.clone()),
    ])
}

pub fn ownership_selector(route_key: &ResourceKey) -> String {
    ownership_labels(route_key).iter().map(|(k, v)| format!("{k}={v}")).join(",")
}

/// Adds the ownership labels of `route_key` to `object`. Objects without a namespace are placed
/// in the route's namespace. The owner reference is only attached when the object lives there.
pub fn stamp_ownership(object: &mut DynamicObject, route_key: &ResourceKey, owner: Option<&OwnerReference>) {
    object.metadata.namespace.get_or_insert_with(|| route_key.namespace.clone());
    let labels = object.metadata.labels.get_or_insert_with(BTreeMap::new);
    labels.extend(ownership_labels(route_key));

    let same_namespace = object.metadata.namespace.as_deref() == Some(route_key.namespace.as_str());
    if let (Some(owner), true) = (owner, same_namespace) {
        let owner_references = object.metadata.owner_references.get_or_insert_with(Vec::new);
        if !owner_references.iter().any(|r| r.uid == owner.uid) {
            owner_references.push(owner.clone());
        }
    }
}
