//! Cattle custom resource definition and creation defaults.

#![forbid(unsafe_code)]

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Replica count assigned to every newly created Cattle.
pub const DEFAULT_SIZE: i32 = 1;

/// Fixed sub-component tags assigned to every newly created Cattle.
pub const DEFAULT_BEEF_PARTS: [&str; 3] = ["chuck", "ribs", "plate"];

/// Cattle is the schema for the cattles API.
///
/// Creation requests only carry a name; the remaining spec fields are
/// filled with fixed defaults and are not client controlled.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "corral.io",
    version = "v1alpha1",
    kind = "Cattle",
    plural = "cattles",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct CattleSpec {
    /// Mirrors `metadata.name`; kept in the spec for downstream consumers.
    pub name: String,

    /// Desired replica count.
    pub size: i32,

    /// Fixed sub-component tags.
    pub beef_parts: Vec<String>,
}

impl Cattle {
    /// Canonical record for a creation request: the requested name plus
    /// defaults everywhere else.
    pub fn with_defaults(name: &str) -> Self {
        Cattle::new(
            name,
            CattleSpec {
                name: name.to_string(),
                size: DEFAULT_SIZE,
                beef_parts: DEFAULT_BEEF_PARTS.iter().map(|s| s.to_string()).collect(),
            },
        )
    }
}
