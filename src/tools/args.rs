//! Schema-driven argument coercion
//!
//! Every tool declares an ordered parameter schema. Whatever calling
//! convention the model used (structured map, `name("x")`, `name(["a","b"])`,
//! `name(100000, ["a","b"])`, `name(symbol="x")`), arguments go through
//! [`coerce`] and come out as a validated [`ToolArgs`] map.

use crate::error::OrchestrationError;
use crate::models::ToolArguments;
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Number, Value};

lazy_static! {
    static ref KEYWORD: Regex =
        Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").expect("keyword pattern is valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Text,
    Number,
    TextList,
}

impl ParamKind {
    /// JSON-schema type name, used when advertising tools to the model
    pub fn schema_type(&self) -> &'static str {
        match self {
            ParamKind::Text => "STRING",
            ParamKind::Number => "NUMBER",
            ParamKind::TextList => "ARRAY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// Literal used when the argument is omitted; `None` means required
    pub default: Option<&'static str>,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            default: None,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, default: &'static str) -> Self {
        Self {
            name,
            kind,
            default: Some(default),
        }
    }
}

/// Validated arguments, keyed by parameter name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    pub fn insert(&mut self, name: &str, value: Value) {
        self.0.insert(name.to_string(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn text(&self, name: &str) -> Result<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| missing(name, "text"))
    }

    pub fn number(&self, name: &str) -> Result<f64> {
        self.0
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| missing(name, "number"))
    }

    pub fn text_list(&self, name: &str) -> Result<Vec<String>> {
        self.0
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .ok_or_else(|| missing(name, "list"))
    }
}

fn missing(name: &str, kind: &str) -> OrchestrationError {
    OrchestrationError::InvalidToolInput(format!("Expected {} argument `{}`", kind, name))
}

fn invalid(message: String) -> OrchestrationError {
    OrchestrationError::InvalidToolInput(message)
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Text(String),
    Number { value: f64, raw: String },
    List(Vec<Literal>),
}

/// Validate and convert call arguments against a tool's schema
pub fn coerce(schema: &[ParamSpec], arguments: &ToolArguments) -> Result<ToolArgs> {
    match arguments {
        ToolArguments::Named(map) => coerce_named(schema, map),
        ToolArguments::Inline(raw) => coerce_inline(schema, raw),
        ToolArguments::Malformed(fragment) => {
            Err(invalid(format!("Invalid tool call syntax: `{}`", fragment)))
        }
    }
}

fn coerce_named(schema: &[ParamSpec], map: &Map<String, Value>) -> Result<ToolArgs> {
    if let Some(unknown) = map.keys().find(|k| !schema.iter().any(|p| p.name == k.as_str())) {
        return Err(invalid(format!("Unknown argument `{}`", unknown)));
    }

    let mut args = ToolArgs::default();
    for param in schema {
        let literal = match map.get(param.name) {
            Some(value) => literal_from_json(value)
                .ok_or_else(|| invalid(format!("Unsupported value for `{}`: {}", param.name, value)))?,
            None => default_literal(param)?,
        };
        let fragment = map
            .get(param.name)
            .map(Value::to_string)
            .unwrap_or_default();
        args.insert(param.name, convert(literal, param, &fragment)?);
    }

    Ok(args)
}

fn coerce_inline(schema: &[ParamSpec], raw: &str) -> Result<ToolArgs> {
    let mut positional: Vec<(&str, Literal)> = Vec::new();
    let mut named: Vec<(&'static str, &str, Literal)> = Vec::new();

    for fragment in split_top_level(raw)? {
        let keyword = KEYWORD.captures(fragment).and_then(|c| {
            let name = c.get(1)?.as_str();
            let param = schema.iter().find(|p| p.name == name)?;
            Some((param.name, c.get(2)?.as_str()))
        });

        match keyword {
            Some((name, value)) => {
                if named.iter().any(|(n, _, _)| *n == name) {
                    return Err(invalid(format!("Argument `{}` given twice: `{}`", name, fragment)));
                }
                named.push((name, fragment, parse_literal(value)?));
            }
            None => {
                if !named.is_empty() {
                    return Err(invalid(format!(
                        "Positional argument after keyword argument: `{}`",
                        fragment
                    )));
                }
                positional.push((fragment, parse_literal(fragment)?));
            }
        }
    }

    // A trailing list parameter absorbs surplus positional values
    if positional.len() > schema.len() {
        match schema.last() {
            Some(last) if last.kind == ParamKind::TextList && !schema.is_empty() => {
                let tail = positional.split_off(schema.len() - 1);
                let fragment = tail.first().map(|(f, _)| *f).unwrap_or_default();
                let items = tail
                    .into_iter()
                    .flat_map(|(_, literal)| match literal {
                        Literal::List(items) => items,
                        scalar => vec![scalar],
                    })
                    .collect();
                positional.push((fragment, Literal::List(items)));
            }
            _ => {
                let extra = positional[schema.len()].0;
                return Err(invalid(format!(
                    "Expected at most {} argument(s), got {}: unexpected `{}`",
                    schema.len(),
                    positional.len(),
                    extra
                )));
            }
        }
    }

    let mut positional = positional.into_iter();
    let mut args = ToolArgs::default();

    for param in schema {
        let from_position = positional.next();
        let from_keyword = named
            .iter()
            .position(|(n, _, _)| *n == param.name)
            .map(|i| named.remove(i));

        let (fragment, literal) = match (from_position, from_keyword) {
            (Some(_), Some((_, fragment, _))) => {
                return Err(invalid(format!(
                    "Argument `{}` given twice: `{}`",
                    param.name, fragment
                )));
            }
            (Some((fragment, literal)), None) => (fragment, literal),
            (None, Some((_, fragment, literal))) => (fragment, literal),
            (None, None) => ("", default_literal(param)?),
        };

        args.insert(param.name, convert(literal, param, fragment)?);
    }

    Ok(args)
}

fn default_literal(param: &ParamSpec) -> Result<Literal> {
    match param.default {
        Some(default) => parse_literal(default),
        None => Err(invalid(format!("Missing required argument `{}`", param.name))),
    }
}

fn convert(literal: Literal, param: &ParamSpec, fragment: &str) -> Result<Value> {
    match (param.kind, literal) {
        (ParamKind::Text, Literal::Text(s)) => Ok(Value::String(s)),
        (ParamKind::Text, Literal::Number { raw, .. }) => Ok(Value::String(raw)),
        (ParamKind::Number, Literal::Number { value, .. }) => number_value(value, fragment),
        (ParamKind::Number, Literal::Text(s)) => match s.trim().parse::<f64>() {
            Ok(value) => number_value(value, fragment),
            Err(_) => Err(invalid(format!(
                "Argument `{}` expects a number, got `{}`",
                param.name, fragment
            ))),
        },
        (ParamKind::TextList, Literal::List(items)) => items
            .into_iter()
            .map(|item| match item {
                Literal::Text(s) => Ok(Value::String(s)),
                Literal::Number { raw, .. } => Ok(Value::String(raw)),
                Literal::List(_) => Err(invalid(format!(
                    "Argument `{}` does not accept nested lists: `{}`",
                    param.name, fragment
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (ParamKind::TextList, Literal::Text(s)) => Ok(Value::Array(vec![Value::String(s)])),
        (ParamKind::TextList, Literal::Number { raw, .. }) => {
            Ok(Value::Array(vec![Value::String(raw)]))
        }
        (_, Literal::List(_)) => Err(invalid(format!(
            "Argument `{}` does not accept a list: `{}`",
            param.name, fragment
        ))),
    }
}

fn number_value(value: f64, fragment: &str) -> Result<Value> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| invalid(format!("Number out of range: `{}`", fragment)))
}

fn literal_from_json(value: &Value) -> Option<Literal> {
    match value {
        Value::String(s) => Some(Literal::Text(s.clone())),
        Value::Number(n) => Some(Literal::Number {
            value: n.as_f64()?,
            raw: n.to_string(),
        }),
        Value::Array(items) => items
            .iter()
            .map(literal_from_json)
            .collect::<Option<Vec<_>>>()
            .map(Literal::List),
        _ => None,
    }
}

/// Split on commas that are outside quotes and brackets
fn split_top_level(raw: &str) -> Result<Vec<&str>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut fragments = Vec::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in raw.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth < 0 {
                    return Err(invalid(format!("Unbalanced `]` in `{}`", raw.trim())));
                }
            }
            ',' if depth == 0 => {
                fragments.push(raw[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(invalid(format!("Unterminated string literal in `{}`", raw.trim())));
    }
    if depth != 0 {
        return Err(invalid(format!("Unbalanced `[` in `{}`", raw.trim())));
    }

    fragments.push(raw[start..].trim());

    if let Some(empty_at) = fragments.iter().position(|f| f.is_empty()) {
        return Err(invalid(format!(
            "Empty argument at position {} in `{}`",
            empty_at + 1,
            raw.trim()
        )));
    }

    Ok(fragments)
}

fn parse_literal(fragment: &str) -> Result<Literal> {
    let fragment = fragment.trim();

    if let Some(inner) = fragment.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or_else(|| invalid(format!("Malformed list literal `{}`", fragment)))?;
        let items = split_top_level(inner)?
            .into_iter()
            .map(parse_literal)
            .collect::<Result<Vec<_>>>()?;
        return Ok(Literal::List(items));
    }

    for q in ['"', '\''] {
        if fragment.starts_with(q) {
            let body = fragment
                .strip_prefix(q)
                .and_then(|rest| rest.strip_suffix(q))
                .filter(|_| fragment.len() >= 2)
                .ok_or_else(|| invalid(format!("Malformed string literal `{}`", fragment)))?;
            return Ok(Literal::Text(unescape(body)));
        }
    }

    if let Ok(value) = fragment.parse::<f64>() {
        if value.is_finite() {
            return Ok(Literal::Number {
                value,
                raw: fragment.to_string(),
            });
        }
    }

    if fragment.contains(['"', '\'', '[', ']']) {
        return Err(invalid(format!("Malformed literal `{}`", fragment)));
    }

    Ok(Literal::Text(fragment.to_string()))
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
