use kube::{api::DynamicObject, ResourceExt};
use tracing::{debug, info, span, Instrument, Level};
use typed_builder::TypedBuilder;

use super::{
    cluster_client::{gvk_of_object, ClusterClient},
    managed_fields::{extract_managed_fields, normalize},
};
use crate::controllers::ControllerError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnforceOutcome {
    pub applied: usize,
    pub skipped_deleting: usize,
}

/// Drives the cluster towards the desired objects, touching only what this field manager owns.
#[derive(TypedBuilder)]
pub struct StateEnforcer<'a> {
    client: &'a dyn ClusterClient,
    field_manager: &'a str,
}

impl StateEnforcer<'_> {
    /// A conflict aborts the pass with [`ControllerError::Conflict`] so the caller can requeue.
    pub async fn enforce(&self, desired: &[DynamicObject]) -> Result<EnforceOutcome, ControllerError> {
        let mut outcome = EnforceOutcome::default();
        for object in desired {
            let gvk = gvk_of_object(object).map_err(|e| ControllerError::InvalidPayload(e.to_string()))?;
            let namespace = object.metadata.namespace.clone();
            let name = object.name_any();
            let key = format!("{}/{name}", namespace.as_deref().unwrap_or_default());
            let span = span!(Level::DEBUG, "StateEnforcer", kind = %gvk.kind, id = %key);

            let live = self.client.get(&gvk, namespace.as_deref(), &name).instrument(span.clone()).await.map_err(|e| ControllerError::client(&gvk.kind, &key, e))?;

            let needs_apply = match live {
                None => true,
                Some(live) if live.metadata.deletion_timestamp.is_some() => {
                    span.in_scope(|| debug!("Object is being deleted, skipping"));
                    outcome.skipped_deleting += 1;
                    false
                }
                Some(live) => match extract_managed_fields(&live, self.field_manager).map_err(|e| ControllerError::InvalidPayload(e.to_string()))? {
                    None => true,
                    Some(snapshot) => {
                        let desired = serde_json::to_value(object).map_err(|e| ControllerError::InvalidPayload(e.to_string()))?;
                        normalize(&desired) != normalize(&snapshot)
                    }
                },
            };

            if needs_apply {
                self.client
                    .apply(object, self.field_manager)
                    .instrument(span.clone())
                    .await
                    .map_err(|e| ControllerError::client(&gvk.kind, &key, e))?;
                span.in_scope(|| info!("Applied"));
                outcome.applied += 1;
            }
        }
        Ok(outcome)
    }
}
