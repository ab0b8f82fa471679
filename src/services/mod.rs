mod cluster_client;
#[cfg(test)]
pub(crate) mod fake;
mod managed_fields;
mod orphan_collector;
mod state_enforcer;

pub use cluster_client::{api_version, get_typed, gvk_for, gvk_of_object, list_typed, to_typed, ClientError, ClusterClient, KubeClusterClient};
pub use managed_fields::{extract_managed_fields, normalize};
pub use orphan_collector::OrphanCollector;
pub use state_enforcer::{EnforceOutcome, StateEnforcer};
