//! Self-referential templating against [`BuildMetadata`].
//!
//! Templates use Go `text/template` action syntax and are rendered with
//! `tera`. Each action is rewritten into its tera form in one pass:
//!
//! - field access with or without the leading dot: `{{.Version}}`,
//!   `{{ repository }}`, `{{ .signing.email }}`, `{{.BuildInfo.Targets.0.Name}}`
//! - `{{ if COND }}`, `{{ else if COND }}`, `{{ else }}`, `{{ end }}` where COND
//!   is a field, `not X`, `and X Y..` or `or X Y..`
//! - `{{ range .List }}..{{ end }}`, with `.Field` relative to the element and
//!   `$.Field` reaching the document root
//! - pipelines into `len`, `html` and `urlquery`
//! - `{{-` and `-}}` whitespace trimming
//!
//! Field names match case-insensitively and ignore `_` and `-`, so
//! `{{.PublishInfo.SkipSigning}}` reaches `publishing.skip-signing`. A path
//! that resolves to nothing renders as the empty string. The strict form
//! `{{ required .Field }}` fails instead.

use crate::metadata::BuildMetadata;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tera::{Context, Tera};
use thiserror::Error;

const TEMPLATE_NAME: &str = "template";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("template execution failed: {0}")]
    Exec(String),
}

pub fn render_template(text: &str, meta: &BuildMetadata) -> Result<String, TemplateError> {
    let source = rewrite(text)?;

    let mut tera = Tera::default();
    tera.autoescape_on(Vec::new());
    tera.register_filter("required", required);
    tera.add_raw_template(TEMPLATE_NAME, &source)
        .map_err(|e| TemplateError::Syntax {
            offset: 0,
            message: error_chain(&e),
        })?;

    let data = serde_json::to_value(meta).map_err(|e| TemplateError::Exec(e.to_string()))?;
    let context =
        Context::from_value(normalize_value(data)).map_err(|e| TemplateError::Exec(error_chain(&e)))?;

    tera.render(TEMPLATE_NAME, &context)
        .map_err(|e| TemplateError::Exec(error_chain(&e)))
}

fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn required(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let unset = match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    if unset {
        let field = args.get("field").and_then(Value::as_str).unwrap_or("field");
        return Err(tera::Error::msg(format!("required field {field} is unset")));
    }
    Ok(value.clone())
}

/// Canonical key for a field name: lowercase, no `_` or `-`, Go aliases
/// folded onto the JSON names.
fn normalize(name: &str) -> String {
    let key: String = name
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    match key.as_str() {
        "buildinfo" => "building".to_owned(),
        "signinfo" => "signing".to_owned(),
        "publishinfo" => "publishing".to_owned(),
        "packageidentifier" => "package".to_owned(),
        "sourcerepository" => "repository".to_owned(),
        "insecurefetch" => "insecureget".to_owned(),
        "source" => "src".to_owned(),
        "destination" => "dst".to_owned(),
        "signature" => "sig".to_owned(),
        _ => key,
    }
}

fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (normalize(&k), normalize_value(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

enum Block {
    If,
    Range(String),
}

/// Rewrite Go action syntax into a tera template.
fn rewrite(text: &str) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(text.len() + 16);
    let mut blocks: Vec<Block> = Vec::new();
    let mut rest = text;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        let at = offset + start;
        let syntax = |message: String| TemplateError::Syntax {
            offset: at,
            message,
        };
        push_literal(&mut out, &rest[..start]);

        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| syntax("unclosed action".to_owned()))?;
        let tag = translate_action(&after[..end], &mut blocks).map_err(syntax)?;
        out.push_str(&tag);

        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    push_literal(&mut out, rest);

    if blocks.is_empty() {
        Ok(out)
    } else {
        Err(TemplateError::Syntax {
            offset: text.len(),
            message: "missing {{ end }}".to_owned(),
        })
    }
}

fn push_literal(out: &mut String, literal: &str) {
    if literal.contains("{%") || literal.contains("{#") {
        out.push_str("{% raw %}");
        out.push_str(literal);
        out.push_str("{% endraw %}");
    } else {
        out.push_str(literal);
    }
}

fn translate_action(raw: &str, blocks: &mut Vec<Block>) -> Result<String, String> {
    let mut body = raw;
    let trim_left = body.starts_with("- ");
    if trim_left {
        body = &body[2..];
    }
    let trim_right = body.ends_with(" -");
    if trim_right {
        body = &body[..body.len() - 2];
    }
    let body = body.trim();
    let (open, close) = (
        if trim_left { "-" } else { "" },
        if trim_right { "-" } else { "" },
    );
    let statement = |inner: String| format!("{{%{open} {inner} {close}%}}");

    let words: Vec<&str> = body.split_whitespace().collect();
    match words.as_slice() {
        [] => Err("empty action".to_owned()),
        ["end"] => match blocks.pop() {
            Some(Block::If) => Ok(statement("endif".to_owned())),
            Some(Block::Range(_)) => Ok(statement("endfor".to_owned())),
            None => Err("unexpected {{ end }}".to_owned()),
        },
        ["else"] => match blocks.last() {
            Some(Block::If) => Ok(statement("else".to_owned())),
            _ => Err("{{ else }} outside {{ if }}".to_owned()),
        },
        ["else", "if", cond @ ..] => match blocks.last() {
            Some(Block::If) => Ok(statement(format!("elif {}", condition(cond, blocks)?))),
            _ => Err("{{ else if }} outside {{ if }}".to_owned()),
        },
        ["if", cond @ ..] => {
            let cond = condition(cond, blocks)?;
            blocks.push(Block::If);
            Ok(statement(format!("if {cond}")))
        }
        ["range", list] => {
            let list = field_path(list, blocks)?;
            let var = format!("item{}", blocks.len() + 1);
            let tag = statement(format!("for {var} in {list}"));
            blocks.push(Block::Range(var));
            Ok(tag)
        }
        ["required", path] => Ok(format!(
            "{{{{{open} {} | default(value=\"\") | required(field=\"{path}\") {close}}}}}",
            field_path(path, blocks)?
        )),
        [first, ..] if is_keyword(first) => Err(format!("unsupported action '{body}'")),
        _ => Ok(format!(
            "{{{{{open} {} {close}}}}}",
            pipeline(body, blocks)?
        )),
    }
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "if" | "else" | "end" | "range" | "with" | "define" | "template" | "block" | "required"
    )
}

fn condition(words: &[&str], blocks: &[Block]) -> Result<String, String> {
    let operands = |items: &[&str]| -> Result<Vec<String>, String> {
        items.iter().map(|w| field_path(w, blocks)).collect()
    };
    match words {
        [] => Err("missing condition".to_owned()),
        [path] => field_path(path, blocks),
        ["not", path] => Ok(format!("not {}", field_path(path, blocks)?)),
        ["and", rest @ ..] if rest.len() >= 2 => Ok(operands(rest)?.join(" and ")),
        ["or", rest @ ..] if rest.len() >= 2 => Ok(operands(rest)?.join(" or ")),
        _ => Err(format!("unsupported condition '{}'", words.join(" "))),
    }
}

fn pipeline(body: &str, blocks: &[Block]) -> Result<String, String> {
    let mut stages = body.split('|').map(str::trim);
    let operand = stages.next().unwrap_or_default();
    if operand.split_whitespace().count() != 1 {
        return Err(format!("invalid field path '{operand}'"));
    }
    let mut expr = format!("{} | default(value=\"\")", field_path(operand, blocks)?);
    for stage in stages {
        let filter = match stage {
            "len" => "length",
            "html" => "escape",
            "urlquery" => "urlencode",
            other => return Err(format!("unsupported function '{other}'")),
        };
        expr.push_str(" | ");
        expr.push_str(filter);
    }
    Ok(expr)
}

/// Map a Go field reference onto a dotted tera path over the normalized data.
fn field_path(expr: &str, blocks: &[Block]) -> Result<String, String> {
    let current = blocks.iter().rev().find_map(|b| match b {
        Block::Range(var) => Some(var.as_str()),
        Block::If => None,
    });

    let (base, fields) = if let Some(rooted) = expr.strip_prefix("$.") {
        (None, rooted)
    } else if expr == "." {
        return current
            .map(str::to_owned)
            .ok_or_else(|| "'.' is only valid inside {{ range }}".to_owned());
    } else if let Some(relative) = expr.strip_prefix('.') {
        (current, relative)
    } else {
        (None, expr)
    };

    let mut segments: Vec<String> = base.map(str::to_owned).into_iter().collect();
    for segment in fields.split('.') {
        let valid = !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(format!("invalid field path '{expr}'"));
        }
        if segment.chars().all(|c| c.is_ascii_digit()) {
            if segments.is_empty() {
                return Err(format!("invalid field path '{expr}'"));
            }
            segments.push(segment.to_owned());
        } else {
            segments.push(normalize(segment));
        }
    }
    Ok(segments.join("."))
}
