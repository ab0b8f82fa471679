use gateway_api::apis::standard::referencegrants::{ReferenceGrant, ReferenceGrantFrom, ReferenceGrantTo};
use kube::ResourceExt;

use crate::common::{normalize_core_group, ResourceKey};

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FromResourceKey {
    pub group: String,
    pub namespace: String,
    pub kind: String,
}

impl From<&ResourceKey> for FromResourceKey {
    fn from(rk: &ResourceKey) -> Self {
        Self { group: normalize_core_group(Some(&rk.group)), namespace: rk.namespace.clone(), kind: rk.kind.clone() }
    }
}

impl From<&ReferenceGrantFrom> for FromResourceKey {
    fn from(rk: &ReferenceGrantFrom) -> Self {
        Self { group: normalize_core_group(Some(&rk.group)), namespace: rk.namespace.clone(), kind: rk.kind.clone() }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ToResourceKey {
    pub group: String,
    pub name: Option<String>,
    pub kind: String,
}

impl From<&ResourceKey> for ToResourceKey {
    fn from(rk: &ResourceKey) -> Self {
        Self {
            group: normalize_core_group(Some(&rk.group)),
            name: if rk.name.is_empty() { None } else { Some(rk.name.clone()) },
            kind: rk.kind.clone(),
        }
    }
}

impl From<&ReferenceGrantTo> for ToResourceKey {
    fn from(rk: &ReferenceGrantTo) -> Self {
        Self { group: normalize_core_group(Some(&rk.group)), name: rk.name.clone().filter(|name| !name.is_empty()), kind: rk.kind.clone() }
    }
}

impl ToResourceKey {
    /// A grant without a name covers every object of the kind.
    fn is_covered_by(&self, grant: &ToResourceKey) -> bool {
        self.group == grant.group && self.kind == grant.kind && (grant.name.is_none() || grant.name == self.name)
    }
}

/// True when a grant living in the target's namespace lets `from` reference `to`.
pub fn check_reference_grant(grants: &[ReferenceGrant], target_namespace: &str, from: &FromResourceKey, to: &ToResourceKey) -> bool {
    grants
        .iter()
        .filter(|grant| grant.namespace().as_deref() == Some(target_namespace))
        .any(|grant| grant.spec.from.iter().any(|f| FromResourceKey::from(f) == *from) && grant.spec.to.iter().any(|t| to.is_covered_by(&ToResourceKey::from(t))))
}
