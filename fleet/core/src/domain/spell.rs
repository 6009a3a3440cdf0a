// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

/// A named, content-hashed behavior bundle served by the spell store.
///
/// The store's `hash` field is the sole identity signal: the reconciler
/// never inspects `content` to decide whether a reload is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellRecord {
    pub name: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(flatten)]
    pub content: serde_json::Map<String, serde_json::Value>,
}
