//! Monitor field templating.
//!
//! Monitor text fields may contain `{{ ... }}` actions that are filled from the
//! object that triggered reconciliation. Supported actions:
//!
//! | Action | Meaning |
//! |--------|---------|
//! | `{{ .ObjectMeta.Name }}` | field path into the object |
//! | `{{ ClusterName }}` | the configured cluster name |
//! | `{{ ClusterVariables.env }}` | a global rule variable |
//! | `{{ index ClusterVariables "env" }}` | the same, by key |
//! | `{{ index .ObjectMeta.Labels "app" }}` | map lookup by key |
//! | `{{ "literal" }}` | a quoted string |
//!
//! Field path segments match object keys exactly first, then
//! case-insensitively, so `.ObjectMeta.Name` reads `metadata.name` from the
//! serialized object. `{{-` and `-}}` trim surrounding whitespace.
//!
//! Serialized objects leave out unset fields, so a path or `index` key that is
//! missing from a map renders as an empty string rather than failing. Walking
//! into a value that is not a map is still an error.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Result, RuleError};
use crate::monitor::Monitor;
use crate::tags::Ownership;

/// Renders monitor templates against an object and the global variables.
#[derive(Debug, Clone, Copy)]
pub struct TemplateRenderer<'a> {
    variables: &'a BTreeMap<String, String>,
    cluster_name: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
}

fn tokenize(action: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = action.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut literal = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            literal.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    _ => literal.push(c),
                }
            }
            if !closed {
                return Err("unterminated quoted string".to_string());
            }
            tokens.push(Token::Quoted(literal));
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }
    Ok(tokens)
}

static MISSING: Value = Value::Null;

fn field<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    let map = match value {
        Value::Object(map) => map,
        Value::Null => return Some(&MISSING),
        _ => return None,
    };
    if let Some(found) = map.get(segment) {
        return Some(found);
    }
    if let Some((_, found)) = map.iter().find(|(k, _)| k.eq_ignore_ascii_case(segment)) {
        return Some(found);
    }
    // Kubernetes types serialize embedded metadata under different names.
    if segment.eq_ignore_ascii_case("ObjectMeta") {
        return Some(map.get("metadata").unwrap_or(&MISSING));
    }
    if segment.eq_ignore_ascii_case("TypeMeta") {
        return Some(value);
    }
    Some(&MISSING)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

impl<'a> TemplateRenderer<'a> {
    /// Creates a renderer over the rule variables and cluster name.
    #[must_use]
    pub fn new(variables: &'a BTreeMap<String, String>, cluster_name: &'a str) -> Self {
        Self {
            variables,
            cluster_name,
        }
    }

    /// Renders every templated field of `monitor` and appends the ownership tags.
    ///
    /// `context` is the serialized triggering object, or `None` for static
    /// monitors. Any failing field fails the whole monitor.
    pub fn render(
        &self,
        monitor: &Monitor,
        context: Option<&Value>,
        ownership: &Ownership,
    ) -> Result<Monitor> {
        let mut rendered = monitor.clone();
        for (name, slot) in [
            ("name", &mut rendered.name),
            ("query", &mut rendered.query),
            ("message", &mut rendered.message),
        ] {
            if let Some(text) = slot {
                *text = self.render_str(name, text, context)?;
            }
        }
        if let Some(text) = rendered
            .options
            .as_mut()
            .and_then(|o| o.escalation_message.as_mut())
        {
            *text = self.render_str("options.escalation_message", text, context)?;
        }
        for tag in &mut rendered.tags {
            *tag = self.render_str("tags", tag, context)?;
        }
        rendered.tags.extend(ownership.tags());
        Ok(rendered)
    }

    /// Renders a single template string.
    pub fn render_str(&self, field: &str, template: &str, context: Option<&Value>) -> Result<String> {
        let fail = |reason: String| RuleError::Template {
            field: field.to_string(),
            reason,
        };

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            let mut text = &rest[..start];
            let mut body = &rest[start + 2..];
            if let Some(trimmed) = body.strip_prefix('-') {
                if trimmed.starts_with(char::is_whitespace) {
                    text = text.trim_end();
                    body = trimmed;
                }
            }
            out.push_str(text);

            let end = body
                .find("}}")
                .ok_or_else(|| fail("unclosed action".to_string()))?;
            let mut action = &body[..end];
            rest = &body[end + 2..];
            if let Some(trimmed) = action.strip_suffix('-') {
                if trimmed.ends_with(char::is_whitespace) {
                    action = trimmed;
                    rest = rest.trim_start();
                }
            }

            let value = self.eval(action.trim(), context).map_err(&fail)?;
            out.push_str(&value);
        }
        out.push_str(rest);
        Ok(out)
    }

    fn eval(&self, action: &str, context: Option<&Value>) -> std::result::Result<String, String> {
        let tokens = tokenize(action)?;
        match tokens.as_slice() {
            [] => Err("empty action".to_string()),
            [single] => self.operand(single, context).map(|v| display(&v)),
            [Token::Word(func), base, keys @ ..] if func == "index" => {
                let mut value = self.operand(base, context)?;
                if keys.is_empty() {
                    return Err("index requires at least one key".to_string());
                }
                for key in keys {
                    value = index(&value, key)?;
                }
                Ok(display(&value))
            }
            [Token::Word(func), ..] => Err(format!("function {func:?} not defined")),
            [Token::Quoted(_), ..] => Err(format!("unexpected arguments in {action:?}")),
        }
    }

    fn variables(&self) -> Value {
        Value::Object(
            self.variables
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }

    fn operand(&self, token: &Token, context: Option<&Value>) -> std::result::Result<Value, String> {
        let word = match token {
            Token::Quoted(literal) => return Ok(Value::String(literal.clone())),
            Token::Word(word) => word.as_str(),
        };

        if let Some(path) = word.strip_prefix('.') {
            let root = context.ok_or_else(|| format!("{word} used without an object in scope"))?;
            if path.is_empty() {
                return Ok(root.clone());
            }
            return walk(root, path).cloned();
        }

        if word == "ClusterName" {
            return Ok(Value::String(self.cluster_name.to_string()));
        }

        if let Some(rest) = word.strip_prefix("ClusterVariables") {
            let variables = self.variables();
            return match rest.strip_prefix('.') {
                None if rest.is_empty() => Ok(variables),
                Some(path) => walk(&variables, path).cloned(),
                None => Err(format!("function {word:?} not defined")),
            };
        }

        Err(format!("function {word:?} not defined"))
    }
}

fn walk<'v>(root: &'v Value, path: &str) -> std::result::Result<&'v Value, String> {
    let mut current = root;
    for segment in path.split('.') {
        current = field(current, segment)
            .ok_or_else(|| format!("can't evaluate field {segment} in .{path}"))?;
    }
    Ok(current)
}

fn index(value: &Value, key: &Token) -> std::result::Result<Value, String> {
    let found = match (value, key) {
        (Value::Object(map), Token::Quoted(k)) => Some(map.get(k).unwrap_or(&MISSING)),
        (Value::Null, Token::Quoted(_)) => Some(&MISSING),
        (Value::Array(items), Token::Word(w)) => w.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    };
    found
        .cloned()
        .ok_or_else(|| format!("can't index {} with {key:?}", display(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn deployment() -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "checkout",
                "namespace": "shop",
                "labels": {"app": "checkout"}
            },
            "spec": {"replicas": 3}
        })
    }

    fn variables() -> BTreeMap<String, String> {
        [("env".to_string(), "prod".to_string())].into_iter().collect()
    }

    mod render_str_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("Alert {{ .ObjectMeta.Name }}", "Alert checkout" ; "object meta alias")]
        #[test_case("{{.metadata.namespace}}/{{ .Metadata.Name }}", "shop/checkout" ; "serialized names")]
        #[test_case("{{ .Kind }} {{ .TypeMeta.Kind }}", "Deployment Deployment" ; "type meta")]
        #[test_case("replicas={{ .Spec.Replicas }}", "replicas=3" ; "number")]
        #[test_case("{{ index .ObjectMeta.Labels \"app\" }}", "checkout" ; "index map")]
        #[test_case("env:{{ ClusterVariables.env }}", "env:prod" ; "variables dot")]
        #[test_case("env:{{ index ClusterVariables \"env\" }}", "env:prod" ; "variables index")]
        #[test_case("{{ ClusterName }}", "prod-eu" ; "cluster name")]
        #[test_case("a  {{- \"b\" -}}  c", "abc" ; "trim markers")]
        #[test_case("plain text", "plain text" ; "no actions")]
        #[test_case("ns={{ .ObjectMeta.Namespace }}", "ns=" ; "unset field")]
        #[test_case("team={{ index .ObjectMeta.Labels \"team\" }}", "team=" ; "missing label")]
        #[test_case("{{ index .ObjectMeta.Annotations \"owner\" }}|{{ .ObjectMeta.Annotations.owner }}", "|" ; "unset map")]
        #[test_case("{{ .Status.ReadyReplicas }}", "" ; "unset parent")]
        #[test_case("env:{{ index ClusterVariables \"region\" }}", "env:" ; "missing variable")]
        fn renders(template: &str, expected: &str) {
            let vars = variables();
            let renderer = TemplateRenderer::new(&vars, "prod-eu");
            let out = renderer
                .render_str("name", template, Some(&deployment()))
                .unwrap();
            assert_eq!(out, expected);
        }

        #[test_case("{{ .ObjectMeta.Name " ; "unclosed")]
        #[test_case("{{ .Spec.Replicas.Count }}" ; "field of number")]
        #[test_case("{{ index .Spec.Replicas \"x\" }}" ; "index of number")]
        #[test_case("{{ index .ObjectMeta.Labels }}" ; "index without key")]
        #[test_case("{{ }}" ; "empty action")]
        #[test_case("{{ upper .Kind }}" ; "unknown function")]
        #[test_case("{{ \"open }}" ; "unterminated literal")]
        fn fails(template: &str) {
            let vars = variables();
            let renderer = TemplateRenderer::new(&vars, "");
            let err = renderer
                .render_str("message", template, Some(&deployment()))
                .unwrap_err();
            assert!(matches!(err, RuleError::Template { ref field, .. } if field == "message"));
        }

        #[test]
        fn unlabeled_namespace_renders_empty_values() {
            let vars = variables();
            let renderer = TemplateRenderer::new(&vars, "");
            let namespace = json!({"kind": "Namespace", "metadata": {"name": "shop"}});
            let out = renderer
                .render_str(
                    "name",
                    "{{ .ObjectMeta.Name }}:{{ .ObjectMeta.Namespace }}:{{ index .ObjectMeta.Labels \"team\" }}",
                    Some(&namespace),
                )
                .unwrap();
            assert_eq!(out, "shop::");
        }

        #[test]
        fn object_path_without_context_fails() {
            let vars = variables();
            let renderer = TemplateRenderer::new(&vars, "");
            assert!(renderer.render_str("name", "{{ .ObjectMeta.Name }}", None).is_err());
            assert_eq!(
                renderer.render_str("name", "{{ ClusterVariables.env }}", None).unwrap(),
                "prod"
            );
        }
    }

    mod render_tests {
        use super::*;
        use crate::monitor::MonitorOptions;

        fn template() -> Monitor {
            Monitor {
                name: Some("Alert {{ .ObjectMeta.Name }}".to_string()),
                query: Some("avg:cpu{deployment:{{ .ObjectMeta.Name }}} > 90".to_string()),
                message: Some("{{ ClusterName }} is hot".to_string()),
                tags: vec!["app:{{ index .ObjectMeta.Labels \"app\" }}".to_string()],
                options: Some(MonitorOptions {
                    escalation_message: Some("still {{ .ObjectMeta.Name }}".to_string()),
                    ..MonitorOptions::default()
                }),
                ..Monitor::default()
            }
        }

        #[test]
        fn renders_fields_and_appends_ownership() {
            let vars = variables();
            let renderer = TemplateRenderer::new(&vars, "prod-eu");
            let ownership = Ownership::new("kubemon", "deployment", "shop/checkout");
            let out = renderer
                .render(&template(), Some(&deployment()), &ownership)
                .unwrap();

            assert_eq!(out.name.as_deref(), Some("Alert checkout"));
            assert_eq!(out.query.as_deref(), Some("avg:cpu{deployment:checkout} > 90"));
            assert_eq!(out.message.as_deref(), Some("prod-eu is hot"));
            assert_eq!(out.escalation_message(), Some("still checkout"));
            assert_eq!(
                out.tags,
                vec![
                    "app:checkout".to_string(),
                    "kubemon".to_string(),
                    "kubemon:object_type:deployment".to_string(),
                    "kubemon:resource:shop/checkout".to_string(),
                ]
            );
        }

        #[test]
        fn rendering_is_repeatable() {
            let vars = variables();
            let renderer = TemplateRenderer::new(&vars, "prod-eu");
            let ownership = Ownership::new("kubemon", "deployment", "shop/checkout");
            let first = renderer.render(&template(), Some(&deployment()), &ownership);
            let second = renderer.render(&template(), Some(&deployment()), &ownership);
            assert_eq!(first.unwrap(), second.unwrap());
        }

        #[test]
        fn failing_field_fails_monitor() {
            let vars = variables();
            let renderer = TemplateRenderer::new(&vars, "");
            let ownership = Ownership::static_monitors("kubemon");
            let err = renderer.render(&template(), None, &ownership).unwrap_err();
            assert!(matches!(err, RuleError::Template { ref field, .. } if field == "name"));
        }
    }
}
