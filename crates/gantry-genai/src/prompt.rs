use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GenAiError, GenAiResult};

/// Rewrite `{{Name}}` placeholders to the canonical dotted form
/// `{{.Name}}`. Input containing any `{{.` is assumed canonical already and
/// returned unchanged. An unmatched `{{` is copied verbatim; execution
/// rejects it later.
pub fn normalize(template: &str) -> String {
    if template.contains("{{.") {
        return template.to_string();
    }
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
            Some(end) => {
                let name = after[..end].trim();
                out.push_str("{{.");
                out.push_str(name);
                out.push_str("}}");
                rest = &after[end + 2..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => "<no value>".to_string(),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Execute a canonical template against the parameter mapping. Unbound names
/// render as `<no value>`; malformed placeholders fail the parse.
fn execute(template: &str, params: &HashMap<String, Value>) -> GenAiResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(GenAiError::TemplateParse(
                "unclosed placeholder".to_string(),
            ));
        };
        let inner = after[..end].trim();
        let Some(name) = inner.strip_prefix('.') else {
            return Err(GenAiError::TemplateParse(format!(
                "unexpected placeholder {inner:?}"
            )));
        };
        match params.get(name) {
            Some(value) => out.push_str(&render_value(value)),
            None => out.push_str("<no value>"),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Canonical template text.
    pub template: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, template: &str) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), name, template)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, template: &str) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            name: name.into(),
            version: None,
            template: normalize(template),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn format(&self, params: &HashMap<String, Value>) -> GenAiResult<String> {
        execute(&self.template, params)
    }
}

/// Template store keyed by id. Single-threaded by contract.
#[derive(Debug, Default)]
pub struct PromptStore {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> GenAiResult<&PromptTemplate> {
        self.templates
            .get(id)
            .ok_or_else(|| GenAiError::TemplateNotFound(id.to_string()))
    }

    pub fn add(&mut self, template: PromptTemplate) -> GenAiResult<()> {
        if self.templates.contains_key(&template.id) {
            return Err(GenAiError::DuplicateTemplate(template.id));
        }
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    /// Replace an existing template, keeping its creation epoch and
    /// refreshing the update epoch.
    pub fn update(&mut self, mut template: PromptTemplate) -> GenAiResult<()> {
        let existing = self
            .templates
            .get(&template.id)
            .ok_or_else(|| GenAiError::TemplateNotFound(template.id.clone()))?;
        template.created_at = existing.created_at;
        template.updated_at = now_ms();
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    pub fn list(&self) -> Vec<&PromptTemplate> {
        self.templates.values().collect()
    }

    pub fn remove(&mut self, id: &str) -> GenAiResult<PromptTemplate> {
        self.templates
            .remove(id)
            .ok_or_else(|| GenAiError::TemplateNotFound(id.to_string()))
    }
}

fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn normalize_rewrites_simple_placeholders() {
        let canonical = normalize("Hi {{ Name }}, you have {{Count}} msgs.");
        assert_eq!(canonical, "Hi {{.Name}}, you have {{.Count}} msgs.");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("Hi {{ Name }}!");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn canonical_input_is_left_alone() {
        let input = "Hi {{.Name}}, also {{ NotRewritten }}";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn unmatched_brace_is_copied_then_fails_execution() {
        let template = PromptTemplate::new("broken", "Hello {{Name");
        assert_eq!(template.template, "Hello {{Name");
        let err = template.format(&HashMap::new()).unwrap_err();
        assert!(matches!(err, GenAiError::TemplateParse(_)));
    }

    #[test]
    fn format_renders_parameters() {
        let template = PromptTemplate::new("greet", "Hi {{ Name }}, you have {{Count}} msgs.");
        let output = template
            .format(&params(&[
                ("Name", Value::String("Alice".to_string())),
                ("Count", Value::from(5)),
            ]))
            .unwrap();
        assert_eq!(output, "Hi Alice, you have 5 msgs.");
    }

    #[test]
    fn missing_keys_render_the_sentinel() {
        let template = PromptTemplate::new("greet", "Hi {{Name}}!");
        let output = template.format(&HashMap::new()).unwrap();
        assert_eq!(output, "Hi <no value>!");
    }

    #[test]
    fn arrays_render_one_item_per_line() {
        let template = PromptTemplate::new("list", "Previous:\n{{Items}}");
        let output = template
            .format(&params(&[(
                "Items",
                Value::Array(vec![Value::from("one"), Value::from("two")]),
            )]))
            .unwrap();
        assert_eq!(output, "Previous:\none\ntwo");
    }

    #[test]
    fn store_rejects_duplicate_add() {
        let mut store = PromptStore::new();
        let template = PromptTemplate::with_id("t1", "greet", "Hi {{Name}}");
        store.add(template.clone()).unwrap();
        assert!(matches!(
            store.add(template),
            Err(GenAiError::DuplicateTemplate(id)) if id == "t1"
        ));
    }

    #[test]
    fn store_update_preserves_created_epoch() {
        let mut store = PromptStore::new();
        let template = PromptTemplate::with_id("t1", "greet", "Hi {{Name}}");
        let created_at = template.created_at;
        store.add(template).unwrap();

        let replacement = PromptTemplate::with_id("t1", "greet", "Hello {{Name}}");
        store.update(replacement).unwrap();
        let stored = store.get("t1").unwrap();
        assert_eq!(stored.created_at, created_at);
        assert_eq!(stored.template, "Hello {{.Name}}");
    }

    #[test]
    fn store_update_and_remove_require_existing_id() {
        let mut store = PromptStore::new();
        let template = PromptTemplate::with_id("ghost", "greet", "Hi");
        assert!(matches!(
            store.update(template),
            Err(GenAiError::TemplateNotFound(id)) if id == "ghost"
        ));
        assert!(matches!(
            store.remove("ghost"),
            Err(GenAiError::TemplateNotFound(_))
        ));
    }
}
