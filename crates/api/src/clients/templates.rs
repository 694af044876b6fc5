//! File-backed JSON templates for the transformation port.
//!
//! A template is a JSON document whose string leaves may hold `{{ dotted.path }}`
//! placeholders resolved against the transformation model. A leaf that is
//! exactly one placeholder takes the model value as-is, keeping its JSON type;
//! placeholders inside longer strings are interpolated as text.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use saga::{SagaError, Transformer};
use serde_json::{Map, Value};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Renders named templates parsed once from a directory.
///
/// Loading happens at construction so request handling never touches the
/// filesystem, and a missing or broken template stops startup.
#[derive(Debug, Clone)]
pub struct TemplateTransformer {
    templates: Arc<HashMap<String, Value>>,
}

impl TemplateTransformer {
    /// Reads and parses every named template under `root`.
    pub fn load<S: AsRef<str>>(root: impl AsRef<Path>, names: &[S]) -> Result<Self, SagaError> {
        let root = root.as_ref();
        let mut templates = HashMap::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let path = root.join(name);
            let text = std::fs::read_to_string(&path).map_err(|e| {
                SagaError::Transformation(format!("cannot read template {}: {e}", path.display()))
            })?;
            let template: Value = serde_json::from_str(&text)
                .map_err(|e| SagaError::Transformation(format!("invalid template {name}: {e}")))?;
            templates.insert(name.to_string(), template);
        }
        tracing::info!(root = %root.display(), count = templates.len(), "templates loaded");

        Ok(Self {
            templates: Arc::new(templates),
        })
    }
}

impl Transformer for TemplateTransformer {
    fn transform(&self, template: &str, model: &Value) -> Result<Value, SagaError> {
        let document = self
            .templates
            .get(template)
            .ok_or_else(|| SagaError::Transformation(format!("unknown template {template}")))?;
        render(document, model)
    }
}

/// Renders a template node against `model`.
pub fn render(node: &Value, model: &Value) -> Result<Value, SagaError> {
    match node {
        Value::String(text) => render_text(text, model),
        Value::Array(items) => items
            .iter()
            .map(|item| render(item, model))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(fields) => {
            let mut out = Map::with_capacity(fields.len());
            for (key, value) in fields {
                out.insert(key.clone(), render(value, model)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn render_text(text: &str, model: &Value) -> Result<Value, SagaError> {
    if let Some(path) = whole_placeholder(text) {
        return Ok(lookup(model, path).cloned().unwrap_or(Value::Null));
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let end = after.find(CLOSE).ok_or_else(|| {
            SagaError::Transformation(format!("unterminated placeholder in {text:?}"))
        })?;
        match lookup(model, after[..end].trim()) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after[end + CLOSE.len()..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

fn whole_placeholder(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
    if inner.contains(OPEN) || inner.contains(CLOSE) {
        return None;
    }
    Some(inner.trim())
}

/// Resolves a dotted path; numeric segments index into arrays.
fn lookup<'a>(model: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(model, |node, key| match node {
        Value::Object(fields) => fields.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model() -> Value {
        json!({
            "content": {
                "req_payload": { "email": "a@b.com", "rewardsOptIn": true },
                "crm_search_profile": { "records": [{ "LastName": "Smith" }] },
                "version": "v58.0"
            }
        })
    }

    #[test]
    fn test_whole_value_placeholder_keeps_type() {
        let out = render(&json!({ "optIn": "{{ content.req_payload.rewardsOptIn }}" }), &model())
            .unwrap();
        assert_eq!(out, json!({ "optIn": true }));
    }

    #[test]
    fn test_embedded_placeholders_interpolate() {
        let out = render(
            &json!("/services/data/{{content.version}}/sobjects/{{ content.crm_search_profile.records.0.LastName }}"),
            &model(),
        )
        .unwrap();
        assert_eq!(out, json!("/services/data/v58.0/sobjects/Smith"));
    }

    #[test]
    fn test_unresolved_paths_render_empty() {
        let out = render(
            &json!({ "a": "{{ content.missing }}", "b": "x{{ content.missing }}y", "c": [1, null] }),
            &model(),
        )
        .unwrap();
        assert_eq!(out, json!({ "a": null, "b": "xy", "c": [1, null] }));
    }

    #[test]
    fn test_unterminated_placeholder_fails() {
        let err = render(&json!("hello {{ content.version"), &model()).unwrap_err();
        assert!(matches!(err, SagaError::Transformation(_)));
    }

    #[test]
    fn test_missing_template_fails_at_load() {
        let err = TemplateTransformer::load("/nonexistent-template-root", &["nope.json"]).unwrap_err();
        assert!(matches!(err, SagaError::Transformation(_)));
    }

    #[test]
    fn test_unknown_template_name_fails() {
        let transformer = TemplateTransformer::load("/nonexistent-template-root", &[] as &[&str]).unwrap();
        let err = transformer.transform("nope.json", &model()).unwrap_err();
        assert!(matches!(err, SagaError::Transformation(ref m) if m.contains("nope.json")));
    }
}
