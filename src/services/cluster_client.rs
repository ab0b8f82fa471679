use async_trait::async_trait;
use kube::{
    api::{ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams},
    Api, Client, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tracing::debug;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ClientError {
    #[error("object not found")]
    NotFound,
    #[error("conflict {0}")]
    Conflict(String),
    #[error("api error {code} {message}")]
    Api { code: u16, message: String },
    #[error("serialization error {0}")]
    Serialization(String),
}

impl From<kube::Error> for ClientError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) if response.code == 404 => ClientError::NotFound,
            kube::Error::Api(response) if response.code == 409 => ClientError::Conflict(response.message),
            kube::Error::Api(response) => ClientError::Api { code: response.code, message: response.message },
            kube::Error::SerdeError(e) => ClientError::Serialization(e.to_string()),
            e => ClientError::Api { code: 0, message: e.to_string() },
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(error: serde_json::Error) -> Self {
        ClientError::Serialization(error.to_string())
    }
}

/// Generic access to cluster objects, typed by GVK only.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Result<Option<DynamicObject>, ClientError>;
    async fn list(&self, gvk: &GroupVersionKind, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<DynamicObject>, ClientError>;
    /// Server-side apply with `force` set, owned by `field_manager`.
    async fn apply(&self, object: &DynamicObject, field_manager: &str) -> Result<DynamicObject, ClientError>;
    async fn delete(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Result<(), ClientError>;
    /// JSON merge patch against the status subresource.
    async fn patch_status(&self, gvk: &GroupVersionKind, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<(), ClientError>;
}

pub fn api_version(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    }
}

pub fn gvk_for<K: Resource<DynamicType = ()>>() -> GroupVersionKind {
    GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
}

pub fn gvk_of_object(object: &DynamicObject) -> Result<GroupVersionKind, ClientError> {
    let types = object.types.as_ref().ok_or(ClientError::Serialization(format!("object {} has no type information", object.name_any())))?;
    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", types.api_version.as_str()),
    };
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

pub fn to_typed<K: DeserializeOwned>(object: &DynamicObject) -> Result<K, ClientError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

pub async fn get_typed<K>(client: &dyn ClusterClient, namespace: Option<&str>, name: &str) -> Result<Option<K>, ClientError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    client.get(&gvk_for::<K>(), namespace, name).await?.as_ref().map(to_typed::<K>).transpose()
}

pub async fn list_typed<K>(client: &dyn ClusterClient, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<K>, ClientError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    client.list(&gvk_for::<K>(), namespace, label_selector).await?.iter().map(to_typed::<K>).collect()
}

#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, gvk: &GroupVersionKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(gvk);
        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Result<Option<DynamicObject>, ClientError> {
        Ok(self.api(gvk, namespace).get_opt(name).await?)
    }

    async fn list(&self, gvk: &GroupVersionKind, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<DynamicObject>, ClientError> {
        let params = match label_selector {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };
        Ok(self.api(gvk, namespace).list(&params).await?.items)
    }

    async fn apply(&self, object: &DynamicObject, field_manager: &str) -> Result<DynamicObject, ClientError> {
        let gvk = gvk_of_object(object)?;
        let name = object.metadata.name.clone().ok_or(ClientError::Serialization("object without a name can't be applied".to_owned()))?;
        let mut object = object.clone();
        object.metadata.managed_fields = None;
        object.metadata.resource_version = None;
        debug!("Applying {}/{} {name} as {field_manager}", gvk.group, gvk.kind);
        let api = self.api(&gvk, object.metadata.namespace.as_deref());
        Ok(api.patch(&name, &PatchParams::apply(field_manager).force(), &Patch::Apply(&object)).await?)
    }

    async fn delete(&self, gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Result<(), ClientError> {
        self.api(gvk, namespace).delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn patch_status(&self, gvk: &GroupVersionKind, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<(), ClientError> {
        self.api(gvk, Some(namespace)).patch_status(name, &PatchParams::default(), &Patch::Merge(patch)).await?;
        Ok(())
    }
}
