//! Static viewer assets and the `.tpl` templating pass.
//!
//! Templates interpolate dotted paths into the tour document: `<%= name %>` writes the value
//! as-is and `<%- scenes.0.name %>` HTML-escapes it. Strings are written without quotes,
//! `null` as nothing, arrays and objects as compact JSON.
//!
//! Code blocks:
//!
//! - `<% for scene in scenes %>…<% end %>` repeats its body per list item, binding `scene`
//!   and `loop.index` / `loop.first` / `loop.last`;
//! - `<% if settings.autorotateEnabled %>…<% else %>…<% end %>`, also `<% if not path %>`;
//! - `<%# comment %>` renders nothing.
//!
//! Any other block is rejected.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use serde_json::Value;
use thiserror::Error;

use crate::fs::archive_path;

use super::Result;

const TEMPLATE_EXTENSION: &str = ".tpl";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    #[error("unterminated tag starting at byte {0}")]
    Unterminated(usize),
    #[error("unsupported code block `{0}`")]
    UnsupportedBlock(String),
    #[error("block `{0}` is never closed with `end`")]
    UnclosedBlock(String),
    #[error("`{0}` without a matching block")]
    UnexpectedTag(String),
    #[error("`{0}` is not a list")]
    NotIterable(String),
    #[error("template is not valid UTF-8")]
    NotUtf8,
}

/// A file copied into the archive root. Paths use `/` separators.
#[derive(Clone, PartialEq, Eq)]
pub struct TemplateAsset {
    pub name: String,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for TemplateAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateAsset").field("name", &self.name).field("len", &self.data.len()).finish()
    }
}

impl TemplateAsset {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), data: data.into() }
    }

    pub fn is_template(&self) -> bool {
        self.name.ends_with(TEMPLATE_EXTENSION) && self.name.len() > TEMPLATE_EXTENSION.len()
    }

    /// Archive name: the `.tpl` extension is stripped from templates.
    pub fn output_name(&self) -> &str {
        if self.is_template() { &self.name[..self.name.len() - TEMPLATE_EXTENSION.len()] } else { &self.name }
    }

    /// Bytes to store in the archive, rendering templates against `context`.
    pub fn render(&self, context: &Value) -> std::result::Result<Vec<u8>, TemplateError> {
        if !self.is_template() {
            return Ok(self.data.clone());
        }
        let source = std::str::from_utf8(&self.data).map_err(|_| TemplateError::NotUtf8)?;
        render(source, context).map(String::into_bytes)
    }
}

/// Load every file below `dir`, sorted by archive path.
pub fn load_dir(dir: &Path) -> Result<Vec<TemplateAsset>> {
    if !dir.is_dir() {
        return Err(anyhow!("template directory {} does not exist", dir.display()));
    }
    let mut assets = Vec::new();
    collect(dir, &mut Vec::new(), &mut assets)?;
    assets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(assets)
}

fn collect(dir: &Path, prefix: &mut Vec<String>, out: &mut Vec<TemplateAsset>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("reading template directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        prefix.push(name);
        if entry.file_type()?.is_dir() {
            collect(&path, prefix, out)?;
        } else {
            let data = fs::read(&path).with_context(|| format!("reading template asset {}", path.display()))?;
            out.push(TemplateAsset::new(archive_path(prefix.as_slice()), data));
        }
        prefix.pop();
    }
    Ok(())
}

/// Render a template string against a JSON context.
pub fn render(source: &str, context: &Value) -> std::result::Result<String, TemplateError> {
    let mut tokens = tokenize(source)?.into_iter();
    let (nodes, closer) = parse(&mut tokens)?;
    match closer {
        Closer::Eof => {}
        Closer::Else => return Err(TemplateError::UnexpectedTag("else".into())),
        Closer::End => return Err(TemplateError::UnexpectedTag("end".into())),
    }

    let mut out = String::with_capacity(source.len());
    eval(&nodes, context, &mut Vec::new(), &mut out)?;
    Ok(out)
}

#[derive(Debug)]
enum Token<'t> {
    Text(&'t str),
    Output { path: &'t str, escape: bool },
    For { binding: &'t str, path: &'t str },
    If { path: &'t str, negate: bool },
    Else,
    End,
}

#[derive(Debug)]
enum Node<'t> {
    Text(&'t str),
    Output { path: &'t str, escape: bool },
    For { binding: &'t str, path: &'t str, body: Vec<Node<'t>> },
    If { path: &'t str, negate: bool, then: Vec<Node<'t>>, otherwise: Vec<Node<'t>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closer {
    Else,
    End,
    Eof,
}

/// One active `for` iteration.
#[derive(Debug)]
struct Frame<'t, 'v> {
    binding: &'t str,
    item: &'v Value,
    index: usize,
    len: usize,
}

fn tokenize(source: &str) -> std::result::Result<Vec<Token<'_>>, TemplateError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find("<%") {
        if start > 0 {
            tokens.push(Token::Text(&rest[..start]));
        }
        let after_open = &rest[start + 2..];
        let end = after_open.find("%>").ok_or(TemplateError::Unterminated(offset + start))?;
        let body = &after_open[..end];

        if let Some(expr) = body.strip_prefix('=') {
            tokens.push(Token::Output { path: expr.trim(), escape: false });
        } else if let Some(expr) = body.strip_prefix('-') {
            tokens.push(Token::Output { path: expr.trim(), escape: true });
        } else if !body.starts_with('#') {
            tokens.push(classify(body.trim())?);
        }

        let consumed = start + 2 + end + 2;
        rest = &rest[consumed..];
        offset += consumed;
    }
    if !rest.is_empty() {
        tokens.push(Token::Text(rest));
    }
    Ok(tokens)
}

fn classify(code: &str) -> std::result::Result<Token<'_>, TemplateError> {
    let words: Vec<&str> = code.split_whitespace().collect();
    match words.as_slice() {
        ["for", binding, "in", path] if is_identifier(binding) => Ok(Token::For { binding: *binding, path: *path }),
        ["if", "not", path] => Ok(Token::If { path: *path, negate: true }),
        ["if", path] => Ok(Token::If { path: *path, negate: false }),
        ["else"] => Ok(Token::Else),
        ["end"] => Ok(Token::End),
        _ => Err(TemplateError::UnsupportedBlock(code.to_string())),
    }
}

fn is_identifier(word: &str) -> bool {
    word != "loop"
        && word.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && word.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse<'t>(
    tokens: &mut std::vec::IntoIter<Token<'t>>,
) -> std::result::Result<(Vec<Node<'t>>, Closer), TemplateError> {
    let mut nodes = Vec::new();
    while let Some(token) = tokens.next() {
        match token {
            Token::Text(text) => nodes.push(Node::Text(text)),
            Token::Output { path, escape } => nodes.push(Node::Output { path, escape }),
            Token::For { binding, path } => {
                let (body, closer) = parse(tokens)?;
                match closer {
                    Closer::End => {}
                    Closer::Else => return Err(TemplateError::UnexpectedTag("else".into())),
                    Closer::Eof => return Err(TemplateError::UnclosedBlock(format!("for {binding} in {path}"))),
                }
                nodes.push(Node::For { binding, path, body });
            }
            Token::If { path, negate } => {
                let (then, closer) = parse(tokens)?;
                let otherwise = match closer {
                    Closer::End => Vec::new(),
                    Closer::Else => match parse(tokens)? {
                        (otherwise, Closer::End) => otherwise,
                        (_, Closer::Else) => return Err(TemplateError::UnexpectedTag("else".into())),
                        (_, Closer::Eof) => return Err(TemplateError::UnclosedBlock(format!("if {path}"))),
                    },
                    Closer::Eof => return Err(TemplateError::UnclosedBlock(format!("if {path}"))),
                };
                nodes.push(Node::If { path, negate, then, otherwise });
            }
            Token::Else => return Ok((nodes, Closer::Else)),
            Token::End => return Ok((nodes, Closer::End)),
        }
    }
    Ok((nodes, Closer::Eof))
}

fn eval<'t, 'v>(
    nodes: &[Node<'t>],
    context: &'v Value,
    frames: &mut Vec<Frame<'t, 'v>>,
    out: &mut String,
) -> std::result::Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output { path, escape } => {
                let value =
                    value_of(path, frames, context).ok_or_else(|| TemplateError::UnknownVariable(path.to_string()))?;
                let text = display(&value);
                if *escape {
                    out.push_str(&escape_html(&text));
                } else {
                    out.push_str(&text);
                }
            }
            Node::For { binding, path, body } => {
                let found = resolve(path, frames, context).ok_or_else(|| TemplateError::UnknownVariable(path.to_string()))?;
                let Value::Array(items) = found else {
                    return Err(TemplateError::NotIterable(path.to_string()));
                };
                for (index, item) in items.iter().enumerate() {
                    frames.push(Frame { binding: *binding, item, index, len: items.len() });
                    let result = eval(body, context, frames, out);
                    frames.pop();
                    result?;
                }
            }
            Node::If { path, negate, then, otherwise } => {
                let truthy = value_of(path, frames, context).is_some_and(|value| is_truthy(&value));
                let branch = if truthy != *negate { then } else { otherwise };
                eval(branch, context, frames, out)?;
            }
        }
    }
    Ok(())
}

/// Resolve `path`, with `loop.index`, `loop.first` and `loop.last` describing the innermost loop.
fn value_of<'v>(path: &str, frames: &[Frame<'_, 'v>], context: &'v Value) -> Option<Cow<'v, Value>> {
    if let Some(value) = loop_field(path, frames) {
        return Some(Cow::Owned(value));
    }
    resolve(path, frames, context).map(Cow::Borrowed)
}

fn loop_field(path: &str, frames: &[Frame<'_, '_>]) -> Option<Value> {
    let field = path.strip_prefix("loop.")?;
    let frame = frames.last()?;
    match field {
        "index" => Some(Value::from(frame.index)),
        "first" => Some(Value::Bool(frame.index == 0)),
        "last" => Some(Value::Bool(frame.index + 1 == frame.len)),
        _ => None,
    }
}

/// Loop bindings shadow the document, innermost first.
fn resolve<'v>(path: &str, frames: &[Frame<'_, 'v>], context: &'v Value) -> Option<&'v Value> {
    if path.is_empty() {
        return None;
    }
    let (head, tail) = match path.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (path, None),
    };
    match frames.iter().rev().find(|frame| frame.binding == head) {
        Some(frame) => match tail {
            Some(tail) => walk(tail, frame.item),
            None => Some(frame.item),
        },
        None => walk(path, context),
    }
}

fn walk<'v>(path: &str, value: &'v Value) -> Option<&'v Value> {
    path.split('.').try_fold(value, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Missing values, `null`, `false`, zero, empty strings and empty collections are false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
