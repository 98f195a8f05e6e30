//! Minimal placeholder templates for descriptors and configuration blocks.
//!
//! Two constructs are understood:
//!
//! - `{{ key }}` substitutes the escaped value of `key`; a missing key is an
//!   error.
//! - `{{#key}} … {{/key}}` keeps its body only when `key` is present and
//!   non-empty. Sections may nest.
//!
//! Values are always escaped for the [`Syntax`] the template targets, so a
//! publication name or path can never inject markup.

use std::collections::BTreeMap;

use crate::error::{PublishError, PublishResult};

pub type Context = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// XML attribute/text content; values are entity-escaped.
    Xml,
    /// Double-quoted server directives; values that would need escaping are
    /// rejected instead.
    ServerConfig,
}

impl Syntax {
    fn escape(self, key: &str, value: &str) -> Result<String, String> {
        match self {
            Syntax::Xml => Ok(xml_escape(value)),
            Syntax::ServerConfig => {
                match value.chars().find(|ch| matches!(ch, '"' | '\\' | '\n' | '\r')) {
                    Some(ch) => Err(format!(
                        "value of '{key}' contains {ch:?}, which cannot appear in a server directive"
                    )),
                    None => Ok(value.to_string()),
                }
            }
        }
    }
}

pub fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Value(String),
    Section { key: String, body: Vec<Node> },
}

#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    syntax: Syntax,
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(name: impl Into<String>, syntax: Syntax, source: &str) -> PublishResult<Self> {
        let name = name.into();
        let nodes = parse_nodes(source).map_err(|message| PublishError::template(&name, message))?;
        Ok(Self {
            name,
            syntax,
            nodes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, context: &Context) -> PublishResult<String> {
        let mut output = String::new();
        render_nodes(&self.nodes, context, self.syntax, &mut output)
            .map_err(|message| PublishError::template(&self.name, message))?;
        Ok(output)
    }
}

fn parse_nodes(source: &str) -> Result<Vec<Node>, String> {
    // Stack of open sections; the bottom entry collects top-level nodes.
    let mut stack: Vec<(Option<String>, Vec<Node>)> = vec![(None, Vec::new())];
    let mut rest = source;

    while let Some(open) = rest.find("{{") {
        let (text, after_open) = rest.split_at(open);
        if !text.is_empty() {
            push_node(&mut stack, Node::Text(text.to_string()));
        }

        let after_open = &after_open[2..];
        let close = after_open
            .find("}}")
            .ok_or_else(|| "unterminated '{{' tag".to_string())?;
        let tag = after_open[..close].trim();
        rest = &after_open[close + 2..];

        if let Some(key) = tag.strip_prefix('#') {
            let key = checked_key(key)?;
            stack.push((Some(key), Vec::new()));
        } else if let Some(key) = tag.strip_prefix('/') {
            let key = checked_key(key)?;
            let (open_key, body) = stack
                .pop()
                .filter(|(open_key, _)| open_key.is_some())
                .ok_or_else(|| format!("section '{key}' closed without being opened"))?;
            let open_key = open_key.unwrap_or_default();
            if open_key != key {
                return Err(format!("section '{open_key}' closed by '{key}'"));
            }
            push_node(&mut stack, Node::Section { key, body });
        } else {
            push_node(&mut stack, Node::Value(checked_key(tag)?));
        }
    }

    if !rest.is_empty() {
        push_node(&mut stack, Node::Text(rest.to_string()));
    }

    if stack.len() > 1 {
        let key = stack
            .last()
            .and_then(|(key, _)| key.clone())
            .unwrap_or_default();
        return Err(format!("section '{key}' is never closed"));
    }

    Ok(stack.pop().map(|(_, nodes)| nodes).unwrap_or_default())
}

fn push_node(stack: &mut [(Option<String>, Vec<Node>)], node: Node) {
    if let Some((_, nodes)) = stack.last_mut() {
        nodes.push(node);
    }
}

fn checked_key(key: &str) -> Result<String, String> {
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(format!("invalid placeholder '{key}'"));
    }
    Ok(key.to_string())
}

fn render_nodes(
    nodes: &[Node],
    context: &Context,
    syntax: Syntax,
    output: &mut String,
) -> Result<(), String> {
    for node in nodes {
        match node {
            Node::Text(text) => output.push_str(text),
            Node::Value(key) => {
                let value = context
                    .get(key)
                    .ok_or_else(|| format!("no value for placeholder '{key}'"))?;
                output.push_str(&syntax.escape(key, value)?);
            }
            Node::Section { key, body } => {
                let enabled = context.get(key).is_some_and(|value| !value.is_empty());
                if enabled {
                    render_nodes(body, context, syntax, output)?;
                }
            }
        }
    }
    Ok(())
}
