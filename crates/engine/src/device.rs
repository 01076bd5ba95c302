// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device classification: free-form tokens → bounded variants.
//!
//! The mapping table is process-wide, seeded with built-in defaults and
//! extensible at runtime. Tokens that miss the table classify to `Unknown`
//! and land in a store-backed review set so a human can map them later; that
//! append is fire-and-forget and never fails the classification.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::store::{Keys, Store};

/// Bounded device variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceClass {
    Mobile,
    Desktop,
    Tablet,
    SmartTv,
    Other,
    Unknown,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 6] = [
        DeviceClass::Mobile,
        DeviceClass::Desktop,
        DeviceClass::Tablet,
        DeviceClass::SmartTv,
        DeviceClass::Other,
        DeviceClass::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "MOBILE",
            Self::Desktop => "DESKTOP",
            Self::Tablet => "TABLET",
            Self::SmartTv => "SMART_TV",
            Self::Other => "OTHER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in token → variant defaults. Tokens are stored lower-cased.
const BUILTIN_MAPPINGS: &[(&str, DeviceClass)] = &[
    ("iphone", DeviceClass::Mobile),
    ("android", DeviceClass::Mobile),
    ("mobile", DeviceClass::Mobile),
    ("phone", DeviceClass::Mobile),
    ("ipad", DeviceClass::Tablet),
    ("tablet", DeviceClass::Tablet),
    ("kindle", DeviceClass::Tablet),
    ("desktop", DeviceClass::Desktop),
    ("pc", DeviceClass::Desktop),
    ("mac", DeviceClass::Desktop),
    ("macintosh", DeviceClass::Desktop),
    ("windows", DeviceClass::Desktop),
    ("linux", DeviceClass::Desktop),
    ("smart_tv", DeviceClass::SmartTv),
    ("smarttv", DeviceClass::SmartTv),
    ("tv", DeviceClass::SmartTv),
    ("roku", DeviceClass::SmartTv),
    ("appletv", DeviceClass::SmartTv),
    ("watch", DeviceClass::Other),
    ("wearable", DeviceClass::Other),
    ("console", DeviceClass::Other),
    ("bot", DeviceClass::Other),
];

/// Process-wide device classifier.
pub struct DeviceClassifier {
    mappings: RwLock<HashMap<String, DeviceClass>>,
    store: Arc<dyn Store>,
    review_key: String,
}

impl DeviceClassifier {
    pub fn new(store: Arc<dyn Store>, keys: &Keys) -> Self {
        let mappings =
            BUILTIN_MAPPINGS.iter().map(|&(token, class)| (token.to_owned(), class)).collect();
        Self { mappings: RwLock::new(mappings), store, review_key: keys.unknown_devices() }
    }

    /// Classify a raw token.
    ///
    /// Absent or blank input is `Unknown` without an audit; an unmapped token
    /// is appended to the review set best-effort and classifies to `Unknown`.
    pub async fn classify(&self, raw: Option<&str>) -> DeviceClass {
        let Some(raw) = raw else {
            return DeviceClass::Unknown;
        };
        let token = raw.trim().to_lowercase();
        if token.is_empty() {
            return DeviceClass::Unknown;
        }
        if let Some(&class) = self.mappings.read().get(&token) {
            return class;
        }
        if let Err(e) = self.store.sadd(&self.review_key, &token).await {
            warn!(token = %token, "failed to record unknown device token: {e}");
        }
        DeviceClass::Unknown
    }

    /// Classify a batch of raw tokens, keyed by the raw input.
    pub async fn classify_batch(&self, raws: &[String]) -> HashMap<String, DeviceClass> {
        let mut out = HashMap::with_capacity(raws.len());
        for raw in raws {
            let class = self.classify(Some(raw)).await;
            out.insert(raw.clone(), class);
        }
        out
    }

    /// Register a runtime mapping. `Unknown` is not a mappable target.
    pub fn add_mapping(&self, raw: &str, class: DeviceClass) -> Result<()> {
        if class == DeviceClass::Unknown {
            return Err(EngineError::invalid("cannot map a token to UNKNOWN"));
        }
        let token = raw.trim().to_lowercase();
        if token.is_empty() {
            return Err(EngineError::invalid("device token must not be blank"));
        }
        self.mappings.write().insert(token, class);
        Ok(())
    }

    /// Whether a token resolves without auditing.
    pub fn is_known(&self, raw: &str) -> bool {
        let token = raw.trim().to_lowercase();
        !token.is_empty() && self.mappings.read().contains_key(&token)
    }

    /// Sorted snapshot of the current mapping table.
    pub fn current_mappings(&self) -> BTreeMap<String, DeviceClass> {
        self.mappings.read().iter().map(|(t, &c)| (t.clone(), c)).collect()
    }

    /// Raw tokens recorded for review.
    pub async fn get_unknowns(&self) -> Result<Vec<String>> {
        self.store.smembers(&self.review_key).await
    }

    /// Drop the review set.
    pub async fn clear_unknowns(&self) -> Result<()> {
        self.store.sclear(&self.review_key).await
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
