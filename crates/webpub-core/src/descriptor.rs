//! VRD descriptor rendering.

use std::path::{Path, PathBuf};

use serde::Serialize;
use webpub_config::DescriptorSettings;

use crate::error::{PublishError, PublishResult};
use crate::template::{Context, Syntax, Template};

pub const DESCRIPTOR_TEMPLATE_NAME: &str = "vrd.xml";
pub const DESCRIPTOR_EXTENSION: &str = "vrd";

const DEFAULT_DESCRIPTOR_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<point xmlns="http://v8.1c.ru/8.2/virtual-resource-system"
		xmlns:xs="http://www.w3.org/2001/XMLSchema"
		xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
		base="{{ url_path }}"
		ib="{{ infobase }}">
{{#debug}}	<debug enable="true"
			protocol="{{ debug_protocol }}"
			url="{{ debug }}"/>
{{/debug}}	<ws pointEnableCommon="true"/>
	<standardOdata enable="false"/>
</point>
"#;

/// What a publication connects to. Server and file infobases are mutually
/// exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionTarget {
    Server {
        infobase: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        server: Option<String>,
    },
    File {
        path: PathBuf,
    },
}

impl ConnectionTarget {
    pub fn server(infobase: impl Into<String>) -> Self {
        ConnectionTarget::Server {
            infobase: infobase.into(),
            server: None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ConnectionTarget::File { .. })
    }

    /// 1C connection string. Quotes inside values are doubled, as the
    /// platform expects.
    pub fn connection_string(&self, default_server: Option<&str>) -> Result<String, String> {
        match self {
            ConnectionTarget::Server { infobase, server } => {
                let server = server
                    .as_deref()
                    .or(default_server)
                    .ok_or_else(|| {
                        format!(
                            "server infobase '{infobase}' needs a server address; set descriptor.server_addr"
                        )
                    })?;
                Ok(format!(
                    "Srvr=\"{}\";Ref=\"{}\";",
                    double_quotes(server),
                    double_quotes(infobase)
                ))
            }
            ConnectionTarget::File { path } => Ok(format!(
                "File=\"{}\";",
                double_quotes(&path.to_string_lossy())
            )),
        }
    }
}

fn double_quotes(value: &str) -> String {
    value.replace('"', "\"\"")
}

/// Global rendering parameters taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct DescriptorParams {
    pub server_addr: Option<String>,
    pub debug: Option<String>,
    pub extra: Context,
}

impl From<&DescriptorSettings> for DescriptorParams {
    fn from(settings: &DescriptorSettings) -> Self {
        Self {
            server_addr: settings.server_addr.clone(),
            debug: settings.debug.clone(),
            extra: settings.params.clone(),
        }
    }
}

/// Rendered descriptor content together with where it belongs on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub path: PathBuf,
    pub content: String,
}

pub fn default_template() -> Template {
    Template::parse(DESCRIPTOR_TEMPLATE_NAME, Syntax::Xml, DEFAULT_DESCRIPTOR_TEMPLATE)
        .expect("built-in descriptor template is well formed")
}

pub fn descriptor_path(vrd_dir: &Path, name: &str) -> PathBuf {
    vrd_dir.join(format!("{name}.{DESCRIPTOR_EXTENSION}"))
}

pub fn render(
    template: &Template,
    target: &ConnectionTarget,
    url_path: &str,
    params: &DescriptorParams,
) -> PublishResult<String> {
    let infobase = target
        .connection_string(params.server_addr.as_deref())
        .map_err(|message| PublishError::template(template.name(), message))?;

    let mut context = params.extra.clone();
    context.insert("url_path".into(), url_path.to_string());
    context.insert("infobase".into(), infobase);

    match target {
        ConnectionTarget::Server { infobase, server } => {
            context.insert("ibname".into(), infobase.clone());
            if let Some(server) = server.as_ref().or(params.server_addr.as_ref()) {
                context.insert("server_addr".into(), server.clone());
            }
        }
        ConnectionTarget::File { path } => {
            let path = path.to_string_lossy().into_owned();
            context.insert("ibname".into(), path.clone());
            context.insert("infobase_filepath".into(), path);
            context.insert("is_file_infobase".into(), "true".into());
            if let Some(server) = &params.server_addr {
                context.insert("server_addr".into(), server.clone());
            }
        }
    }

    if let Some(debug) = &params.debug {
        context.insert("debug".into(), debug.clone());
        context.insert("debug_protocol".into(), debug_protocol(debug).into());
    }

    template.render(&context)
}

fn debug_protocol(url: &str) -> &'static str {
    if url.starts_with("http://") || url.starts_with("https://") {
        "http"
    } else {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DescriptorParams {
        DescriptorParams {
            server_addr: Some("localhost".into()),
            ..DescriptorParams::default()
        }
    }

    #[test]
    fn renders_server_infobase() {
        let rendered = render(
            &default_template(),
            &ConnectionTarget::server("test"),
            "/1c/test",
            &params(),
        )
        .unwrap();
        assert!(rendered.contains(r#"base="/1c/test""#));
        assert!(rendered.contains(r#"ib="Srvr=&quot;localhost&quot;;Ref=&quot;test&quot;;""#));
        assert!(!rendered.contains("<debug"));
    }

    #[test]
    fn renders_file_infobase_and_debug() {
        let mut params = params();
        params.debug = Some("tcp://localhost:1560".into());
        let rendered = render(
            &default_template(),
            &ConnectionTarget::File {
                path: PathBuf::from("/srv/ib/acc"),
            },
            "/1c/acc",
            &params,
        )
        .unwrap();
        assert!(rendered.contains(r#"ib="File=&quot;/srv/ib/acc&quot;;""#));
        assert!(rendered.contains(r#"protocol="tcp""#));
        assert!(rendered.contains(r#"url="tcp://localhost:1560""#));
    }

    #[test]
    fn hostile_names_cannot_break_markup() {
        let rendered = render(
            &default_template(),
            &ConnectionTarget::server(r#"a";Usr="admin"/><x y=""#),
            "/1c/a",
            &params(),
        )
        .unwrap();
        assert!(!rendered.contains("<x"));
        assert!(rendered.contains(
            "Ref=&quot;a&quot;&quot;;Usr=&quot;&quot;admin&quot;&quot;/&gt;&lt;x y=&quot;&quot;&quot;;"
        ));
    }

    #[test]
    fn server_target_without_address_fails() {
        let err = render(
            &default_template(),
            &ConnectionTarget::server("test"),
            "/1c/test",
            &DescriptorParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PublishError::TemplateRender { .. }));
    }

    #[test]
    fn per_target_server_overrides_global() {
        let rendered = render(
            &default_template(),
            &ConnectionTarget::Server {
                infobase: "hr".into(),
                server: Some("srv1c:1541".into()),
            },
            "/1c/hr",
            &params(),
        )
        .unwrap();
        assert!(rendered.contains("Srvr=&quot;srv1c:1541&quot;"));
    }

    #[test]
    fn extra_params_reach_custom_templates() {
        let template = Template::parse(
            "vrd.xml",
            Syntax::Xml,
            r#"<point base="{{ url_path }}" pool="{{ pool_size }}"/>"#,
        )
        .unwrap();
        let mut params = params();
        params.extra.insert("pool_size".into(), "10".into());
        let rendered =
            render(&template, &ConnectionTarget::server("a"), "/1c/a", &params).unwrap();
        assert_eq!(rendered, r#"<point base="/1c/a" pool="10"/>"#);
    }
}
