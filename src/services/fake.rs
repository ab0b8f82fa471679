use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{FieldsV1, ManagedFieldsEntry};
use kube::api::{DynamicObject, GroupVersionKind};
use serde_json::{Map, Value};

use super::cluster_client::{api_version, gvk_of_object, ClientError, ClusterClient};

type ObjectKey = (String, String, String, String);

fn object_key(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> ObjectKey {
    (api_version.to_owned(), kind.to_owned(), namespace.unwrap_or_default().to_owned(), name.to_owned())
}

fn key_of(object: &DynamicObject) -> ObjectKey {
    let types = object.types.clone().unwrap_or_default();
    object_key(&types.api_version, &types.kind, object.metadata.namespace.as_deref(), object.metadata.name.as_deref().unwrap_or_default())
}

/// In-memory cluster recording every mutating call.
#[derive(Default)]
pub struct FakeClusterClient {
    objects: Mutex<BTreeMap<ObjectKey, DynamicObject>>,
    failing_deletes: Mutex<BTreeSet<String>>,
    vanishing_deletes: Mutex<BTreeSet<String>>,
    status_patches: Mutex<Vec<(String, Value)>>,
    conflict_on_apply: AtomicBool,
    conflict_on_status: AtomicBool,
    resource_version: AtomicUsize,
    pub applies: AtomicUsize,
    pub deletes: AtomicUsize,
    pub lists: AtomicUsize,
}

impl FakeClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(objects: impl IntoIterator<Item = Value>) -> Self {
        let client = Self::new();
        for object in objects {
            client.insert(object);
        }
        client
    }

    /// Stores an object as is, bypassing field management.
    pub fn insert(&self, object: Value) {
        let object: DynamicObject = serde_json::from_value(object).unwrap();
        self.objects.lock().unwrap().insert(key_of(&object), object);
    }

    pub fn object(&self, api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> Option<DynamicObject> {
        self.objects.lock().unwrap().get(&object_key(api_version, kind, namespace, name)).cloned()
    }

    pub fn objects_of_kind(&self, kind: &str) -> Vec<DynamicObject> {
        self.objects.lock().unwrap().iter().filter(|(key, _)| key.1 == kind).map(|(_, object)| object.clone()).collect()
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.failing_deletes.lock().unwrap().insert(name.to_owned());
    }

    /// The object disappears just before the delete lands, as if someone else removed it first.
    pub fn not_found_on_delete_of(&self, name: &str) {
        self.vanishing_deletes.lock().unwrap().insert(name.to_owned());
    }

    pub fn conflict_on_apply(&self, conflict: bool) {
        self.conflict_on_apply.store(conflict, Ordering::SeqCst);
    }

    pub fn conflict_on_status(&self, conflict: bool) {
        self.conflict_on_status.store(conflict, Ordering::SeqCst);
    }

    pub fn apply_count(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn status_patches(&self) -> Vec<(String, Value)> {
        self.status_patches.lock().unwrap().clone()
    }

    fn next_resource_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

fn fields_of(value: &Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(object.iter().map(|(key, value)| (format!("f:{key}"), fields_of(value))).collect()),
        _ => Value::Object(Map::new()),
    }
}

fn applied_fields(object: &Value) -> Value {
    let mut object = object.clone();
    if let Value::Object(map) = &mut object {
        map.remove("apiVersion");
        map.remove("kind");
        map.remove("status");
    }
    fields_of(&object)
}

fn matches_selector(object: &DynamicObject, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = object.metadata.labels.clone().unwrap_or_default();
    selector.split(',').filter(|requirement| !requirement.is_empty()).all(|requirement| match requirement.split_once('=') {
        Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
        None => labels.contains_key(requirement),
    })
}

fn merge_patch(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                } else {
                    merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn get(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Result<Option<DynamicObject>, ClientError> {
        Ok(self.object(&api_version(gvk), &gvk.kind, namespace, name))
    }

    async fn list(&self, gvk: &GroupVersionKind, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<DynamicObject>, ClientError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let api_version = api_version(gvk);
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.0 == api_version && key.1 == gvk.kind)
            .filter(|(key, _)| namespace.map_or(true, |namespace| key.2 == namespace))
            .filter(|(_, object)| matches_selector(object, label_selector))
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn apply(&self, object: &DynamicObject, field_manager: &str) -> Result<DynamicObject, ClientError> {
        if self.conflict_on_apply.load(Ordering::SeqCst) {
            return Err(ClientError::Conflict("the object has been modified".to_owned()));
        }
        self.applies.fetch_add(1, Ordering::SeqCst);
        let gvk = gvk_of_object(object)?;
        let key = key_of(object);

        let mut applied = object.clone();
        let fields = applied_fields(&serde_json::to_value(object)?);
        let mut objects = self.objects.lock().unwrap();
        let mut managed_fields = vec![];
        if let Some(existing) = objects.get(&key) {
            applied.metadata.uid = existing.metadata.uid.clone();
            applied.metadata.deletion_timestamp = existing.metadata.deletion_timestamp.clone();
            if let Some(status) = existing.data.get("status") {
                applied.data["status"] = status.clone();
            }
            managed_fields.extend(existing.metadata.managed_fields.iter().flatten().filter(|entry| entry.manager.as_deref() != Some(field_manager)).cloned());
        }
        managed_fields.push(ManagedFieldsEntry {
            api_version: Some(api_version(&gvk)),
            fields_type: Some("FieldsV1".to_owned()),
            fields_v1: Some(FieldsV1(fields)),
            manager: Some(field_manager.to_owned()),
            operation: Some("Apply".to_owned()),
            subresource: None,
            time: None,
        });
        applied.metadata.managed_fields = Some(managed_fields);
        applied.metadata.resource_version = Some(self.next_resource_version());
        objects.insert(key, applied.clone());
        Ok(applied)
    }

    async fn delete(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Result<(), ClientError> {
        if self.failing_deletes.lock().unwrap().contains(name) {
            return Err(ClientError::Api { code: 500, message: format!("refusing to delete {name}") });
        }
        let removed = self.objects.lock().unwrap().remove(&object_key(&api_version(gvk), &gvk.kind, namespace, name));
        if self.vanishing_deletes.lock().unwrap().contains(name) {
            return Err(ClientError::NotFound);
        }
        match removed {
            Some(_) => {
                self.deletes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(ClientError::NotFound),
        }
    }

    async fn patch_status(&self, gvk: &GroupVersionKind, namespace: &str, name: &str, patch: &Value) -> Result<(), ClientError> {
        if self.conflict_on_status.load(Ordering::SeqCst) {
            return Err(ClientError::Conflict("the object has been modified".to_owned()));
        }
        let key = object_key(&api_version(gvk), &gvk.kind, Some(namespace), name);
        let mut objects = self.objects.lock().unwrap();
        let object = objects.get_mut(&key).ok_or(ClientError::NotFound)?;
        let mut value = serde_json::to_value(&*object)?;
        if let Some(status) = patch.get("status") {
            merge_patch(&mut value, &serde_json::json!({ "status": status }));
        }
        *object = serde_json::from_value(value)?;
        object.metadata.resource_version = Some(self.next_resource_version());
        self.status_patches.lock().unwrap().push((format!("{namespace}/{name}"), patch.clone()));
        Ok(())
    }
}
