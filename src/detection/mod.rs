//! Detection service coordination
//!
//! The service call itself happens outside the crate (a host callback). This
//! module owns everything around it:
//! - `DetectionRequest`/`DetectionResponse`: the wire shapes
//! - `DetectionTracker`: snapshot tags, superseding, staleness
//! - `Debouncer`: coalesce rapid edits into one call
//! - `reconcile`: pure merge step of `(current text, response, tag)`

pub mod debounce;
pub mod reconcile;
pub mod tracker;

pub use debounce::*;
pub use reconcile::*;
pub use tracker::*;

use serde::{Deserialize, Serialize};

use crate::session::{Entity, KnownEntity, ModifierWire};

/// Body of a detection call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRequest {
    /// Text segments; offsets in the response are relative to each segment
    pub text: Vec<String>,
    #[serde(alias = "knownEntities", default)]
    pub known_entities: Vec<KnownEntity>,
    #[serde(default)]
    pub modifiers: Vec<ModifierWire>,
}

impl DetectionRequest {
    pub fn single(text: impl Into<String>, known_entities: Vec<KnownEntity>, modifiers: Vec<ModifierWire>) -> Self {
        Self { text: vec![text.into()], known_entities, modifiers }
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| format!("Failed to serialize detection request: {}", e))
    }
}

/// Service reply: `pii[i]` holds the entities found in `text[i]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResponse {
    #[serde(default)]
    pub text: Vec<String>,
    #[serde(default)]
    pub pii: Vec<Vec<Entity>>,
}

impl DetectionResponse {
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Invalid detection response: {}", e))
    }
}
