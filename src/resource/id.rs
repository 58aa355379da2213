//! ARM resource ids
//!
//! Parses ids such as
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Network/virtualNetworks/{vnet}/subnets/{subnet}`
//! including extension resources nested under another resource
//! (`{scope}/providers/Microsoft.Authorization/roleAssignments/{name}`).

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// The subscription- or resource-group-level ancestor of an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootScope {
    Tenant,
    Subscription {
        subscription_id: String,
    },
    ResourceGroup {
        subscription_id: String,
        name: String,
    },
}

impl fmt::Display for RootScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootScope::Tenant => write!(f, "/"),
            RootScope::Subscription { subscription_id } => {
                write!(f, "/subscriptions/{}", subscription_id)
            }
            RootScope::ResourceGroup {
                subscription_id,
                name,
            } => write!(
                f,
                "/subscriptions/{}/resourceGroups/{}",
                subscription_id, name
            ),
        }
    }
}

/// The namespace and type chain of the innermost `providers/...` block of an id
#[derive(Debug, Clone)]
struct ProviderBlock {
    namespace: String,
    types: Vec<String>,
}

/// A parsed ARM resource id.
///
/// Equality and hashing are case-insensitive on the canonical form, so ids
/// returned by different endpoints with different casing dedup together.
#[derive(Debug, Clone)]
pub struct ResourceId {
    canonical: String,
    root: RootScope,
    provider: Option<ProviderBlock>,
}

impl ResourceId {
    /// Parse an id, failing on anything that does not follow the ARM grammar
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidResourceId {
            id: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Err(invalid("must start with '/'"));
        };
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        if rest.is_empty() {
            return Err(invalid("id is empty"));
        }

        let segs: Vec<&str> = rest.split('/').collect();
        if segs.iter().any(|s| s.is_empty()) {
            return Err(invalid("contains an empty segment"));
        }

        let mut i;
        let root = if segs[0].eq_ignore_ascii_case("subscriptions") {
            let Some(subscription_id) = segs.get(1) else {
                return Err(invalid("missing subscription id"));
            };
            if segs
                .get(2)
                .is_some_and(|s| s.eq_ignore_ascii_case("resourceGroups"))
            {
                let Some(name) = segs.get(3) else {
                    return Err(invalid("missing resource group name"));
                };
                i = 4;
                RootScope::ResourceGroup {
                    subscription_id: subscription_id.to_string(),
                    name: name.to_string(),
                }
            } else {
                i = 2;
                RootScope::Subscription {
                    subscription_id: subscription_id.to_string(),
                }
            }
        } else if segs[0].eq_ignore_ascii_case("providers") {
            i = 0;
            RootScope::Tenant
        } else {
            return Err(invalid("must start with 'subscriptions' or 'providers'"));
        };

        let mut provider = None;
        while i < segs.len() {
            if !segs[i].eq_ignore_ascii_case("providers") {
                return Err(invalid(&format!("expected 'providers', found {:?}", segs[i])));
            }
            let Some(namespace) = segs.get(i + 1) else {
                return Err(invalid("missing provider namespace"));
            };
            i += 2;

            let mut types = Vec::new();
            while i < segs.len() && !segs[i].eq_ignore_ascii_case("providers") {
                if segs.get(i + 1).is_none() {
                    return Err(invalid(&format!("missing name for type {:?}", segs[i])));
                }
                types.push(segs[i].to_string());
                i += 2;
            }
            if types.is_empty() {
                return Err(invalid(&format!("no resource type under provider {namespace}")));
            }

            provider = Some(ProviderBlock {
                namespace: namespace.to_string(),
                types,
            });
        }

        Ok(Self {
            canonical: format!("/{}", segs.join("/")),
            root,
            provider,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Uppercased canonical form, the dedup key for resource sets
    pub fn key(&self) -> String {
        self.canonical.to_uppercase()
    }

    pub fn root_scope(&self) -> &RootScope {
        &self.root
    }

    /// Type path used for schema lookup, e.g. `/Microsoft.Network/virtualNetworks/subnets`
    pub fn route_scope_string(&self) -> String {
        match (&self.provider, &self.root) {
            (Some(p), _) => format!("/{}/{}", p.namespace, p.types.join("/")),
            (None, RootScope::ResourceGroup { .. }) => "/Microsoft.Resources/resourceGroups".to_string(),
            (None, RootScope::Subscription { .. }) => "/Microsoft.Resources/subscriptions".to_string(),
            (None, RootScope::Tenant) => "/".to_string(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}
