use kube::api::DynamicObject;
use serde_json::{Map, Value};

const APPLY_OPERATION: &str = "Apply";
const RETAINED_METADATA: [&str; 4] = ["labels", "annotations", "ownerReferences", "finalizers"];

/// Projects `object` onto the fields `field_manager` owns through server-side apply.
/// Returns `None` when the manager never applied the object.
pub fn extract_managed_fields(object: &DynamicObject, field_manager: &str) -> Result<Option<Value>, serde_json::Error> {
    let owned_fields = object
        .metadata
        .managed_fields
        .iter()
        .flatten()
        .filter(|entry| entry.manager.as_deref() == Some(field_manager) && entry.operation.as_deref() == Some(APPLY_OPERATION))
        .filter(|entry| entry.subresource.as_deref().unwrap_or_default().is_empty())
        .filter_map(|entry| entry.fields_v1.as_ref().map(|fields| fields.0.clone()))
        .reduce(|mut merged, fields| {
            merge_field_sets(&mut merged, fields);
            merged
        });

    let Some(owned_fields) = owned_fields else {
        return Ok(None);
    };

    let live = serde_json::to_value(object)?;
    Ok(Some(project(&live, &owned_fields).unwrap_or(Value::Object(Map::new()))))
}

fn merge_field_sets(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => merge_field_sets(existing, value),
                    None => {
                        target.insert(key, value);
                    },
                }
            }
        },
        (target, source) => *target = source,
    }
}

fn is_leaf(fields: &Value) -> bool {
    match fields {
        Value::Object(fields) => fields.keys().all(|key| key == "."),
        _ => true,
    }
}

fn project(value: &Value, fields: &Value) -> Option<Value> {
    if is_leaf(fields) {
        return Some(value.clone());
    }
    let Value::Object(fields) = fields else {
        return Some(value.clone());
    };

    match value {
        Value::Object(object) => {
            let projected: Map<String, Value> = fields
                .iter()
                .filter_map(|(key, subfields)| {
                    let name = key.strip_prefix("f:")?;
                    let child = object.get(name)?;
                    project(child, subfields).map(|child| (name.to_owned(), child))
                })
                .collect();
            Some(Value::Object(projected))
        },
        Value::Array(items) => {
            let mut projected: Vec<(usize, Value)> = fields
                .iter()
                .filter_map(|(key, subfields)| {
                    let (index, item) = find_list_item(items, key)?;
                    project(item, subfields).map(|item| (index, item))
                })
                .collect();
            projected.sort_by_key(|(index, _)| *index);
            projected.dedup_by_key(|(index, _)| *index);
            Some(Value::Array(projected.into_iter().map(|(_, item)| item).collect()))
        },
        _ => Some(value.clone()),
    }
}

fn find_list_item<'a>(items: &'a [Value], key: &str) -> Option<(usize, &'a Value)> {
    if let Some(list_key) = key.strip_prefix("k:") {
        let Value::Object(list_key) = serde_json::from_str::<Value>(list_key).ok()? else {
            return None;
        };
        items.iter().enumerate().find(|(_, item)| list_key.iter().all(|(name, expected)| item.get(name) == Some(expected)))
    } else if let Some(set_value) = key.strip_prefix("v:") {
        let set_value = serde_json::from_str::<Value>(set_value).ok()?;
        items.iter().enumerate().find(|(_, item)| **item == set_value)
    } else if let Some(index) = key.strip_prefix("i:") {
        let index = index.parse::<usize>().ok()?;
        items.get(index).map(|item| (index, item))
    } else {
        None
    }
}

/// Strips everything the API server fills in or that this controller never sets, so that a
/// desired object and the managed projection of its live counterpart compare equal.
pub fn normalize(value: &Value) -> Value {
    let mut value = value.clone();
    if let Value::Object(object) = &mut value {
        object.remove("apiVersion");
        object.remove("kind");
        object.remove("status");
        if let Some(Value::Object(metadata)) = object.get_mut("metadata") {
            metadata.retain(|key, _| RETAINED_METADATA.contains(&key.as_str()));
        }
    }
    prune(value).unwrap_or(Value::Object(Map::new()))
}

fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(object) => {
            let object: Map<String, Value> = object.into_iter().filter_map(|(key, value)| prune(value).map(|value| (key, value))).collect();
            if object.is_empty() {
                None
            } else {
                Some(Value::Object(object))
            }
        },
        Value::Array(items) => Some(Value::Array(items.into_iter().map(|item| prune(item).unwrap_or(Value::Object(Map::new()))).collect())),
        value => Some(value),
    }
}
