//! Listing result types and the dedup accumulators shared by the crawl phases

use super::id::ResourceId;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// A discovered resource with its full property document
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    pub id: ResourceId,
    pub properties: Value,
}

impl Resource {
    /// Build a resource from a property document carrying its own `id`
    pub fn from_properties(properties: Value) -> Result<Self, String> {
        if !properties.is_object() {
            return Err(format!("resource body is not an object: {}", properties));
        }
        let id = match properties.get("id") {
            None => return Err(format!("no resource id found in response: {}", properties)),
            Some(Value::String(id)) => id,
            Some(_) => return Err(format!("resource id is not a string: {}", properties)),
        };
        let id = ResourceId::parse(id).map_err(|e| e.to_string())?;
        Ok(Self { id, properties })
    }

    /// The `managedBy` value, if present and non-empty
    pub fn managed_by(&self) -> Option<&Value> {
        match self.properties.get("managedBy") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(v) => Some(v),
        }
    }
}

/// `properties.scope` of a resource body (role assignments and the like)
pub fn scope_of(properties: &Value) -> Option<&str> {
    properties.get("properties")?.get("scope")?.as_str()
}

/// `id` of a resource body
pub fn id_of(properties: &Value) -> Option<&str> {
    properties.get("id")?.as_str()
}

/// A non-fatal failure listing one collection under one parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListError {
    /// Uppercased `<parentId>/<childType>`
    pub endpoint: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub message: String,
}

impl ListError {
    pub fn new(parent_id: &str, child_type: &str, api_version: &str, message: impl Into<String>) -> Self {
        Self {
            endpoint: format!("{}/{}", parent_id, child_type).to_uppercase(),
            api_version: api_version.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listing {} (api-version={}): {}",
            self.endpoint, self.api_version, self.message
        )
    }
}

/// Final output of a listing run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListResult {
    pub resources: Vec<Resource>,
    pub errors: Vec<ListError>,
}

/// Resources deduped by uppercased id, first seen wins
#[derive(Debug, Default)]
pub struct ResourceSet {
    entries: HashMap<String, Resource>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the id is already present. Returns whether it was added.
    pub fn insert(&mut self, resource: Resource) -> bool {
        let key = resource.id.key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, resource);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.entries.values()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.entries.contains_key(&id.key())
    }

    /// Consume into a list sorted by canonical id
    pub fn into_sorted(self) -> Vec<Resource> {
        let mut resources: Vec<Resource> = self.entries.into_values().collect();
        sort_resources(&mut resources);
        resources
    }
}

impl FromIterator<Resource> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut set = ResourceSet::new();
        for resource in iter {
            set.insert(resource);
        }
        set
    }
}

/// List errors deduped by uppercased endpoint, first seen wins
#[derive(Debug, Default)]
pub struct ErrorSet {
    entries: HashMap<String, ListError>,
}

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, error: ListError) -> bool {
        let key = error.endpoint.to_uppercase();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, error);
        true
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = ListError>) {
        for error in errors {
            self.insert(error);
        }
    }

    /// Consume into a list sorted by endpoint
    pub fn into_sorted(self) -> Vec<ListError> {
        let mut errors: Vec<ListError> = self.entries.into_values().collect();
        errors.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        errors
    }
}

pub fn sort_resources(resources: &mut [Resource]) {
    resources.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VNET: &str = "/subscriptions/0000/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1";

    #[test]
    fn test_from_properties() {
        let res = Resource::from_properties(json!({"id": VNET, "name": "vnet1"})).unwrap();
        assert_eq!(res.id.as_str(), VNET);

        let err = Resource::from_properties(json!({"name": "vnet1"})).unwrap_err();
        assert!(err.contains("no resource id"));
        let err = Resource::from_properties(json!({"id": 42})).unwrap_err();
        assert!(err.contains("not a string"));
        assert!(Resource::from_properties(json!({"id": "not-an-id"})).is_err());
        assert!(Resource::from_properties(json!([VNET])).is_err());
    }

    #[test]
    fn test_managed_by() {
        let managed = Resource::from_properties(json!({"id": VNET, "managedBy": "X"})).unwrap();
        assert_eq!(managed.managed_by(), Some(&json!("X")));

        for body in [
            json!({"id": VNET, "managedBy": ""}),
            json!({"id": VNET, "managedBy": null}),
            json!({"id": VNET}),
        ] {
            let res = Resource::from_properties(body).unwrap();
            assert!(res.managed_by().is_none());
        }
    }

    #[test]
    fn test_list_error_display() {
        let err = ListError::new(VNET, "subnets", "2023-01-01", "boom");
        assert_eq!(err.endpoint, format!("{VNET}/subnets").to_uppercase());
        assert_eq!(
            err.to_string(),
            format!("listing {} (api-version=2023-01-01): boom", err.endpoint)
        );
    }

    #[test]
    fn test_resource_set_first_seen_wins() {
        let mut set = ResourceSet::new();
        assert!(set.insert(Resource::from_properties(json!({"id": VNET, "n": 1})).unwrap()));
        assert!(!set.insert(
            Resource::from_properties(json!({"id": VNET.to_lowercase(), "n": 2})).unwrap()
        ));
        let resources = set.into_sorted();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].properties["n"], 1);
    }

    #[test]
    fn test_error_set_dedup_and_sort() {
        let mut set = ErrorSet::new();
        set.extend([
            ListError::new("/b", "x", "v1", "first"),
            ListError::new("/a", "x", "v1", "a"),
            ListError::new("/B", "X", "v2", "second"),
        ]);
        let errors = set.into_sorted();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].endpoint, "/A/X");
        assert_eq!(errors[1].message, "first");
    }

    #[test]
    fn test_scope_of() {
        let body = json!({"properties": {"scope": VNET}});
        assert_eq!(scope_of(&body), Some(VNET));
        assert_eq!(scope_of(&json!({})), None);
        assert_eq!(id_of(&json!({"id": VNET})), Some(VNET));
    }
}
