use std::collections::BTreeSet;

use kube::{
    api::{DynamicObject, GroupVersionKind},
    ResourceExt,
};
use tracing::{info, span, warn, Instrument, Level};
use typed_builder::TypedBuilder;

use super::cluster_client::{api_version, gvk_of_object, ClientError, ClusterClient};
use crate::{
    common::{ownership_selector, ResourceKey},
    controllers::ControllerError,
};

type OutputKey = (String, String, String, String);

fn output_key(gvk: &GroupVersionKind, namespace: &str, name: &str) -> OutputKey {
    (api_version(gvk), gvk.kind.clone(), namespace.to_owned(), name.to_owned())
}

/// Deletes objects previously emitted for a route that are no longer desired.
#[derive(TypedBuilder)]
pub struct OrphanCollector<'a> {
    client: &'a dyn ClusterClient,
    route_key: &'a ResourceKey,
}

impl OrphanCollector<'_> {
    /// Only objects in the route's namespace carrying the route's ownership labels are candidates.
    /// A failed delete does not stop the others; the first failure is returned at the end.
    pub async fn clean(&self, desired: &[DynamicObject], expected_gvks: &[GroupVersionKind]) -> Result<usize, ControllerError> {
        let desired_keys = desired
            .iter()
            .map(|object| {
                let gvk = gvk_of_object(object).map_err(|e| ControllerError::InvalidPayload(e.to_string()))?;
                Ok(output_key(&gvk, object.metadata.namespace.as_deref().unwrap_or(&self.route_key.namespace), &object.name_any()))
            })
            .collect::<Result<BTreeSet<_>, ControllerError>>()?;

        let namespace = self.route_key.namespace.as_str();
        let selector = ownership_selector(self.route_key);
        let mut deleted = 0;
        let mut first_error = None;

        for gvk in expected_gvks {
            let span = span!(Level::DEBUG, "OrphanCollector", kind = %gvk.kind, route = %self.route_key);
            let live = self.client.list(gvk, Some(namespace), Some(&selector)).instrument(span.clone()).await.map_err(|e| ControllerError::GarbageCollection {
                gvk: gvk.kind.clone(),
                namespace: namespace.to_owned(),
                error: Box::new(ControllerError::client(&gvk.kind, namespace, e)),
            })?;

            for object in live {
                let name = object.name_any();
                if desired_keys.contains(&output_key(gvk, namespace, &name)) {
                    continue;
                }
                match self.client.delete(gvk, Some(namespace), &name).instrument(span.clone()).await {
                    Ok(()) => {
                        span.in_scope(|| info!("Deleted orphaned {name}"));
                        deleted += 1;
                    }
                    Err(ClientError::NotFound) => {}
                    Err(e) => {
                        span.in_scope(|| warn!("Can't delete orphaned {name} {e}"));
                        first_error.get_or_insert(ControllerError::GarbageCollection {
                            gvk: gvk.kind.clone(),
                            namespace: namespace.to_owned(),
                            error: Box::new(ControllerError::client(&gvk.kind, format!("{namespace}/{name}"), e)),
                        });
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(deleted),
        }
    }
}
