//! Header-cell templates
//!
//! A header cell containing `{{` is compiled into a [`Template`] and executed
//! once per data record, e.g. `{{ .amount | fen2yuan }}` turns
//! `{"amount": 500}` into `"5.00"`. Syntax and rendering are Go
//! text/template's, provided by `gtmpl`.

mod functions;

pub use functions::{fen2yuan, FunctionTable, TemplateFn};

use crate::types::DataRecord;
use gtmpl::Context;
use gtmpl_value::Value;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Opening action delimiter
pub const OPEN_DELIM: &str = "{{";

/// Error while compiling or executing a template
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateError {
    pub message: String,
}

impl TemplateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TemplateError {}

/// True when `text` should be compiled as a template
pub fn is_template(text: &str) -> bool {
    text.contains(OPEN_DELIM)
}

/// A compiled template
///
/// Cheap to clone; clones share the parsed tree. Rendering takes a lock
/// because `gtmpl::Template` makes no `Sync` promise.
#[derive(Clone)]
pub struct Template {
    name: String,
    source: String,
    inner: Arc<Mutex<gtmpl::Template>>,
}

impl Template {
    /// Compile `source` with every function of `functions` in scope
    ///
    /// Calls to functions outside the table fail here, not at execution.
    pub fn compile(
        name: impl Into<String>,
        source: &str,
        functions: &FunctionTable,
    ) -> Result<Self, TemplateError> {
        let name = name.into();
        let mut inner = gtmpl::Template::default();
        for (func_name, func) in functions.iter() {
            inner.add_func(func_name, func);
        }
        inner
            .parse(source)
            .map_err(|e| TemplateError::new(format!("template {}: {}", name, e)))?;

        Ok(Self {
            name,
            source: source.to_string(),
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render the template with `data` as its context
    ///
    /// A key absent from `data` renders as `<no value>`, as in Go.
    pub fn execute(&self, data: &DataRecord) -> Result<String, TemplateError> {
        let context = Context::from(record_value(data));
        let inner = self
            .inner
            .lock()
            .map_err(|_| TemplateError::new(format!("template {}: lock poisoned", self.name)))?;
        inner
            .render(&context)
            .map_err(|e| TemplateError::new(format!("template {}: {}", self.name, e)))
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

fn record_value(data: &DataRecord) -> Value {
    Value::Map(
        data.iter()
            .map(|(key, value)| (key.clone(), json_to_value(value)))
            .collect(),
    )
}

fn json_to_value(value: &serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match value {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64().map(Value::from).unwrap_or(Value::Nil)
            }
        }
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(json_to_value).collect()),
        Json::Object(map) => record_value(map),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> DataRecord {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("record must be an object"),
        }
    }

    fn run(source: &str, data: serde_json::Value) -> Result<String, TemplateError> {
        Template::compile("t", source, &FunctionTable::builtin())?.execute(&record(data))
    }

    #[test]
    fn test_is_template() {
        assert!(is_template("{{.amount}}"));
        assert!(is_template("=SUM({{.a}})"));
        assert!(!is_template("amount"));
        assert!(!is_template("{ not }"));
    }

    #[test]
    fn test_pipe_to_fen2yuan() {
        assert_eq!(run("{{.amount | fen2yuan}}", json!({"amount": 12345})).unwrap(), "123.45");
        assert_eq!(run("{{ .amount | fen2yuan }}", json!({"amount": "50"})).unwrap(), "0.50");
        assert_eq!(run("{{.amount | fen2yuan}}", json!({"amount": "abc"})).unwrap(), "abc");
    }

    #[test]
    fn test_call_form_and_text_around_actions() {
        assert_eq!(
            run("Total: {{fen2yuan .amount}} CNY", json!({"amount": 500})).unwrap(),
            "Total: 5.00 CNY"
        );
    }

    #[test]
    fn test_formula_text() {
        assert_eq!(
            run("=B{{.row}}*{{.rate}}", json!({"row": 4, "rate": 0.5})).unwrap(),
            "=B4*0.5"
        );
    }

    #[test]
    fn test_nested_field() {
        let data = json!({"order": {"total": 100}, "name": "x"});
        assert_eq!(run("{{.order.total}}", data).unwrap(), "100");
    }

    #[test]
    fn test_missing_key_renders_no_value() {
        let data = json!({"name": "x"});
        assert_eq!(run("[{{.missing}}]", data).unwrap(), "[<no value>]");
    }

    #[test]
    fn test_field_on_scalar_is_execution_error() {
        let err = run("{{.name.first}}", json!({"name": "x"})).unwrap_err();
        assert!(err.message.starts_with("template t:"), "{}", err);
    }

    #[test]
    fn test_arity_error_at_execution() {
        assert!(run("{{fen2yuan .a .b}}", json!({"a": 1, "b": 2})).is_err());
    }

    #[test]
    fn test_compile_errors() {
        let functions = FunctionTable::builtin();
        assert!(Template::compile("t", "{{.amount | nope}}", &functions).is_err());
        assert!(Template::compile("t", "{{.amount", &functions).is_err());
        assert!(Template::compile("t", "{{.amount}}", &FunctionTable::empty()).is_ok());
        assert!(Template::compile("t", "{{fen2yuan .amount}}", &FunctionTable::empty()).is_err());
    }

    #[test]
    fn test_literals_render() {
        assert_eq!(run("{{\"hi\"}} {{true}} {{7}}", json!({})).unwrap(), "hi true 7");
    }

    #[test]
    fn test_template_metadata() {
        let tpl = Template::compile("field_2_tpl", "{{.a}}", &FunctionTable::builtin()).unwrap();
        assert_eq!(tpl.name(), "field_2_tpl");
        assert_eq!(tpl.source(), "{{.a}}");
        assert!(format!("{:?}", tpl).contains("field_2_tpl"));
    }
}
