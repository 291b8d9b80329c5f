//! Per-entity record counts.
//!
//! One `{entity}/count` request per selected entity. The descriptor
//! that comes back carries any payload the transport substituted on
//! failure (the year-scoped retry context), so the echo stored here is
//! what the data stage should send.

use std::collections::HashMap;

use serde_json::{Value, json};

use sispull_core::{Outcome, RequestDescriptor};

use crate::client::short_name;
use crate::stage::QueryStage;

pub struct CountStage {
    entities: Vec<String>,
    /// Payload echo per short name, consumed by the data stage.
    pub payloads: HashMap<String, Value>,
}

impl CountStage {
    pub fn new(entities: Vec<String>) -> Self {
        Self {
            entities,
            payloads: HashMap::new(),
        }
    }
}

impl QueryStage for CountStage {
    fn name(&self) -> &str {
        "count"
    }

    fn prepare(&mut self, _acc: &Value) -> (Value, Vec<RequestDescriptor>) {
        let descs = self
            .entities
            .iter()
            .map(|entity| {
                RequestDescriptor::new(format!("{entity}/count"), short_name(entity))
            })
            .collect();
        (json!({}), descs)
    }

    fn fold(&mut self, outcome: Outcome, desc: &RequestDescriptor) -> Value {
        let count = outcome
            .json()
            .and_then(|body| body["count"].as_u64())
            .unwrap_or(0);
        self.payloads.insert(
            desc.entity_name.clone(),
            desc.payload.clone().unwrap_or_else(|| json!({})),
        );
        log::debug!("{} has {count} records", desc.entity_name);
        json!({ desc.entity_name.clone(): { "count": count } })
    }
}
