//! One publication's block inside the server configuration.
//!
//! A block is delimited by marker comments and must carry an `Alias` and a
//! `ManagedApplicationDescriptor` directive:
//!
//! ```text
//! # --- WEBPUB1C PUBLICATION START: acc
//! Alias "/1c/acc" "/var/www/1c/pub/acc"
//! <Directory "/var/www/1c/pub/acc">
//!     SetHandler 1c-application
//!     ManagedApplicationDescriptor "/var/www/1c/vrd/acc.vrd"
//! </Directory>
//! # --- WEBPUB1C PUBLICATION END: acc
//! ```
//!
//! Blocks are immutable values holding their exact source text, so
//! serializing an untouched block reproduces it byte-for-byte.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::descriptor::ConnectionTarget;
use crate::error::{PublishError, PublishResult};
use crate::naming::PublicationName;
use crate::template::{Context, Syntax, Template};

pub const START_TAG: &str = "# --- WEBPUB1C PUBLICATION START:";
pub const END_TAG: &str = "# --- WEBPUB1C PUBLICATION END:";
pub const BLOCK_TEMPLATE_NAME: &str = "apache_pub.cfg";

const DEFAULT_BLOCK_TEMPLATE: &str = r#"{{#infobase}}# infobase: "{{ infobase }}"
{{/infobase}}{{#infobase_server}}# infobase_server: "{{ infobase_server }}"
{{/infobase_server}}{{#infobase_filepath}}# infobase_filepath: "{{ infobase_filepath }}"
{{/infobase_filepath}}Alias "{{ url_path }}" "{{ directory }}"
<Directory "{{ directory }}">
    AllowOverride All
    Options None
    Require all granted
    SetHandler 1c-application
    ManagedApplicationDescriptor "{{ vrd_filename }}"
</Directory>
"#;

/// Publication name carried by a start marker line, if `line` is one.
pub fn start_marker_name(line: &str) -> Option<&str> {
    marker_name(line, START_TAG)
}

/// Publication name carried by an end marker line, if `line` is one.
pub fn end_marker_name(line: &str) -> Option<&str> {
    marker_name(line, END_TAG)
}

fn marker_name<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.trim_end_matches(['\r', '\n'])
        .strip_prefix(tag)
        .map(str::trim)
}

/// Everything needed to render a fresh block.
#[derive(Debug, Clone)]
pub struct BlockSpec<'a> {
    pub name: &'a PublicationName,
    pub url: &'a str,
    pub directory: &'a Path,
    pub descriptor: &'a Path,
    pub target: &'a ConnectionTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlock {
    name: String,
    url: String,
    url_span: Range<usize>,
    directory: Option<PathBuf>,
    descriptor: PathBuf,
    target: ConnectionTarget,
    raw: String,
}

struct Directives {
    alias: Regex,
    directory: Regex,
    descriptor: Regex,
    infobase: Regex,
    infobase_server: Regex,
    infobase_filepath: Regex,
}

fn directives() -> &'static Directives {
    static DIRECTIVES: OnceLock<Directives> = OnceLock::new();
    DIRECTIVES.get_or_init(|| {
        let compile = |pattern: &str| Regex::new(pattern).expect("valid directive regex");
        Directives {
            alias: compile(r#"(?mi)^[ \t]*Alias[ \t]+"([^"\r\n]*)""#),
            directory: compile(r#"(?mi)^[ \t]*<Directory[ \t]+"([^"\r\n]*)"[ \t]*>"#),
            descriptor: compile(r#"(?mi)^[ \t]*ManagedApplicationDescriptor[ \t]+"([^"\r\n]*)""#),
            infobase: compile(r#"(?m)^[ \t]*#[ \t]*infobase:[ \t]*"([^"\r\n]*)""#),
            infobase_server: compile(r#"(?m)^[ \t]*#[ \t]*infobase_server:[ \t]*"([^"\r\n]*)""#),
            infobase_filepath: compile(
                r#"(?m)^[ \t]*#[ \t]*infobase_filepath:[ \t]*"([^"\r\n]*)""#,
            ),
        }
    })
}

fn capture<'a>(regex: &Regex, text: &'a str) -> Option<regex::Match<'a>> {
    regex.captures(text).and_then(|caps| caps.get(1))
}

impl ConfigBlock {
    pub fn default_template() -> Template {
        Template::parse(BLOCK_TEMPLATE_NAME, Syntax::ServerConfig, DEFAULT_BLOCK_TEMPLATE)
            .expect("built-in block template is well formed")
    }

    /// Recognizes a complete block, markers included. Returns `None` for any
    /// fragment that is not one, so callers can treat it as passthrough.
    pub fn parse(fragment: &str) -> Option<ConfigBlock> {
        let mut lines = fragment.split_inclusive('\n');
        let first = lines.next()?;
        let name = start_marker_name(first)?;
        if name.is_empty() {
            return None;
        }

        let last = fragment.trim_end_matches(['\r', '\n']).rsplit('\n').next()?;
        if end_marker_name(last)? != name {
            return None;
        }
        let body_start = first.len();
        let body_end = body_start + fragment[body_start..].rfind(END_TAG)?;
        let body = &fragment[body_start..body_end];

        let patterns = directives();
        let alias = capture(&patterns.alias, body)?;
        let descriptor = capture(&patterns.descriptor, body)?;
        let directory = capture(&patterns.directory, body).map(|m| PathBuf::from(m.as_str()));

        let target = match capture(&patterns.infobase_filepath, body) {
            Some(path) if !path.as_str().is_empty() => ConnectionTarget::File {
                path: PathBuf::from(path.as_str()),
            },
            _ => ConnectionTarget::Server {
                infobase: capture(&patterns.infobase, body)
                    .map(|m| m.as_str().to_string())
                    .filter(|value| !value.is_empty())
                    .unwrap_or_else(|| name.to_string()),
                server: capture(&patterns.infobase_server, body)
                    .map(|m| m.as_str().to_string())
                    .filter(|value| !value.is_empty()),
            },
        };

        Some(ConfigBlock {
            name: name.to_string(),
            url: alias.as_str().to_string(),
            url_span: body_start + alias.start()..body_start + alias.end(),
            directory,
            descriptor: PathBuf::from(descriptor.as_str()),
            target,
            raw: fragment.to_string(),
        })
    }

    /// Renders a new block through `template` and checks that the result is
    /// recognizable.
    pub fn render(spec: &BlockSpec<'_>, template: &Template) -> PublishResult<ConfigBlock> {
        let mut context = Context::new();
        context.insert("name".into(), spec.name.to_string());
        context.insert("url_path".into(), spec.url.to_string());
        context.insert(
            "directory".into(),
            spec.directory.to_string_lossy().into_owned(),
        );
        context.insert(
            "vrd_filename".into(),
            spec.descriptor.to_string_lossy().into_owned(),
        );
        match spec.target {
            ConnectionTarget::Server { infobase, server } => {
                context.insert("infobase".into(), infobase.clone());
                if let Some(server) = server {
                    context.insert("infobase_server".into(), server.clone());
                }
            }
            ConnectionTarget::File { path } => {
                context.insert(
                    "infobase_filepath".into(),
                    path.to_string_lossy().into_owned(),
                );
            }
        }

        let mut body = template.render(&context)?;
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        let text = format!(
            "{START_TAG} {name}\n{body}{END_TAG} {name}\n",
            name = spec.name
        );

        ConfigBlock::parse(&text).ok_or_else(|| {
            PublishError::template(
                template.name(),
                "rendered block must contain Alias and ManagedApplicationDescriptor directives",
            )
        })
    }

    /// Returns a copy whose `Alias` url is `url`; the rest of the block text
    /// is kept verbatim. `url` must already be validated.
    pub fn with_url(&self, url: &str) -> ConfigBlock {
        let mut raw = String::with_capacity(self.raw.len() + url.len());
        raw.push_str(&self.raw[..self.url_span.start]);
        raw.push_str(url);
        raw.push_str(&self.raw[self.url_span.end..]);

        ConfigBlock {
            url: url.to_string(),
            url_span: self.url_span.start..self.url_span.start + url.len(),
            raw,
            ..self.clone()
        }
    }

    pub fn serialize(&self) -> &str {
        &self.raw
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }
}
