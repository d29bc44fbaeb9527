//! Template Renderer - Go-Style Double-Brace Templates Over JSON Data
//!
//! Descriptor fields and artifact bodies use the `text/template` dialect
//! (`{{.Group}}`, `{{if}}`, `{{range $k, $v := ...}}`), executed by `gtmpl`.
//! This module adapts a `serde_json::Value` context into `gtmpl` values and
//! splits failures into parse and execution errors.
//!
//! JSON objects become `gtmpl` objects, so a missing field is an execution
//! error rather than `<no value>`. Mapping iteration order is not preserved;
//! callers that need declaration order build that output themselves.

use gtmpl::Context;
use gtmpl_value::Value as TemplateValue;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("template parse error: {0}")]
    Parse(String),

    #[error("template execution error: {0}")]
    Exec(String),

    #[error("failed to render {field}: {source}")]
    Field {
        field: String,
        source: Box<TemplateError>,
    },
}

impl TemplateError {
    pub fn is_parse(&self) -> bool {
        match self {
            TemplateError::Parse(_) => true,
            TemplateError::Exec(_) => false,
            TemplateError::Field { source, .. } => source.is_parse(),
        }
    }

    pub(crate) fn in_field(self, field: impl Into<String>) -> Self {
        TemplateError::Field {
            field: field.into(),
            source: Box::new(self),
        }
    }
}

/// A parsed template, reusable across contexts
pub struct Template {
    source: String,
    inner: gtmpl::Template,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut inner = gtmpl::Template::default();
        inner
            .parse(source)
            .map_err(|e| TemplateError::Parse(e.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            inner,
        })
    }

    pub fn execute(&self, data: &Value) -> Result<String, TemplateError> {
        let context = Context::from(to_template_value(data));
        self.inner
            .render(&context)
            .map_err(|e| TemplateError::Exec(e.to_string()))
    }
}

/// Parse and execute in one step. Text without actions is returned as-is.
pub fn render(source: &str, data: &Value) -> Result<String, TemplateError> {
    if !source.contains("{{") {
        return Ok(source.to_string());
    }
    Template::parse(source)?.execute(data)
}

fn to_template_value(value: &Value) -> TemplateValue {
    match value {
        Value::Null => TemplateValue::Nil,
        Value::Bool(b) => TemplateValue::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                TemplateValue::from(i)
            } else if let Some(u) = n.as_u64() {
                TemplateValue::from(u)
            } else {
                TemplateValue::from(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => TemplateValue::from(s.clone()),
        Value::Array(items) => {
            TemplateValue::Array(items.iter().map(to_template_value).collect())
        }
        Value::Object(map) => TemplateValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), to_template_value(v)))
                .collect(),
        ),
    }
}
