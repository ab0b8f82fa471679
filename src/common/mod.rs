mod conditions;
mod labels;
mod resource_key;
mod route;

pub use conditions::{
    deduplicate_by_severity, find_condition, is_condition_true, merge_conditions, new_condition, programmed_condition_for_kind, programmed_condition_type, RouteConditionReason,
    RouteConditionType, CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE, CONDITION_STATUS_UNKNOWN, PROGRAMMED_CONDITION_TYPE,
};
pub use labels::{
    ownership_labels, ownership_selector, stamp_ownership, BACKEND_NAMESPACE_LABEL, BACKEND_NAME_LABEL, GATEWAY_NAMESPACE_LABEL, GATEWAY_NAME_LABEL, ROUTE_KIND_LABEL, ROUTE_NAMESPACE_LABEL,
    ROUTE_NAME_LABEL,
};
pub use resource_key::{normalize_core_group, NamespacedName, ResourceKey, CORE_GROUP_NAME, DEFAULT_GROUP_NAME, DEFAULT_KIND_NAME, DEFAULT_NAMESPACE_NAME, DEFAULT_ROUTE_HOSTNAME, SERVICE_KIND_NAME};
pub use route::{status_patch, BackendReference, ParentReference, RootObject, RouteParentStatus};
