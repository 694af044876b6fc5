//! Transformation port: maps an internal JSON model onto a CRM request shape.

use std::sync::{Arc, RwLock};

use serde_json::{Value, json};

use crate::error::SagaError;

/// Pure mapping from `(template, model)` to a CRM request document.
pub trait Transformer: Send + Sync {
    /// Renders `model` through the named template.
    fn transform(&self, template: &str, model: &Value) -> Result<Value, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryTransformerState {
    calls: Vec<(String, Value)>,
    fail: bool,
}

/// Transformer for testing: echoes the model's `content` under the template name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransformer {
    state: Arc<RwLock<InMemoryTransformerState>>,
}

impl InMemoryTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap().fail = fail;
    }

    /// `(template, model)` pairs received, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.state.read().unwrap().calls.clone()
    }
}

impl Transformer for InMemoryTransformer {
    fn transform(&self, template: &str, model: &Value) -> Result<Value, SagaError> {
        let mut state = self.state.write().unwrap();
        state.calls.push((template.to_string(), model.clone()));

        if state.fail {
            return Err(SagaError::Transformation(format!(
                "template {template} failed to render"
            )));
        }

        Ok(json!({
            "template": template,
            "content": model.get("content").cloned().unwrap_or(Value::Null),
        }))
    }
}
