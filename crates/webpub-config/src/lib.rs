//! Configuration primitives and loader for the webpub1c toolkit.
//!
//! The loader resolves configuration using a fixed precedence stack:
//! override flag → working directory → built-in defaults.
//! Parsed settings are normalised into typed structures so the publication
//! engine never touches raw TOML.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "webpub1c.toml";

/// Template context keys computed by the descriptor renderer. Extra
/// descriptor parameters may not shadow them.
pub const RESERVED_PARAM_KEYS: &[&str] = &[
    "name",
    "url_path",
    "directory",
    "vrd_filename",
    "infobase",
    "infobase_server",
    "ibname",
    "infobase_filepath",
    "is_file_infobase",
    "server_addr",
    "debug",
    "debug_protocol",
];

/// Complete configuration resolved from defaults and on-disk overrides.
#[derive(Clone, Debug)]
pub struct Config {
    pub paths: PathSettings,
    pub publication: PublicationSettings,
    pub module: ModuleSettings,
    pub descriptor: DescriptorSettings,
    pub sources: ConfigSources,
}

/// Filesystem locations shared by every publication.
#[derive(Clone, Debug)]
pub struct PathSettings {
    pub apache_config: PathBuf,
    pub vrd_dir: PathBuf,
    pub publication_root: PathBuf,
    pub templates: Option<PathBuf>,
}

/// Settings applied when publications are written into the server config.
#[derive(Clone, Debug)]
pub struct PublicationSettings {
    pub url_base: String,
    pub backup: bool,
}

/// Location of the web-server extension module shipped with the platform.
#[derive(Clone, Debug)]
pub struct ModuleSettings {
    pub platform_path: PathBuf,
    pub ws_module: String,
}

impl ModuleSettings {
    /// Full path written into the `LoadModule` directive.
    pub fn module_path(&self) -> PathBuf {
        self.platform_path.join(&self.ws_module)
    }
}

/// Global parameters substituted into every rendered descriptor.
#[derive(Clone, Debug, Default)]
pub struct DescriptorSettings {
    pub server_addr: Option<String>,
    pub debug: Option<String>,
    pub params: BTreeMap<String, String>,
}

/// Provenance information for resolved configuration.
#[derive(Clone, Debug)]
pub struct ConfigSources {
    pub working_directory: PathBuf,
    pub layers: Vec<ConfigSource>,
}

/// Specific layer of configuration (default/local/override).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigSource {
    pub kind: ConfigSourceKind,
    pub path: Option<PathBuf>,
    pub base_dir: PathBuf,
}

impl ConfigSource {
    fn default(base_dir: PathBuf) -> Self {
        ConfigSource {
            kind: ConfigSourceKind::Default,
            path: None,
            base_dir,
        }
    }

    fn for_file(kind: ConfigSourceKind, path: PathBuf) -> Self {
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        ConfigSource {
            kind,
            path: Some(path),
            base_dir,
        }
    }

    fn describe(&self) -> String {
        match (&self.kind, &self.path) {
            (ConfigSourceKind::Default, _) => "built-in defaults".to_owned(),
            (kind, Some(path)) => format!("{} at {}", kind, path.display()),
            (kind, None) => kind.to_string(),
        }
    }
}

/// Kinds of configuration sources, ordered from lowest to highest precedence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigSourceKind {
    Default,
    Local,
    Override,
}

impl fmt::Display for ConfigSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfigSourceKind::Default => "defaults",
            ConfigSourceKind::Local => "local config",
            ConfigSourceKind::Override => "override config",
        };
        f.write_str(label)
    }
}

/// Loader options, typically supplied by the CLI layer.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub override_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

impl LoadOptions {
    pub fn with_override_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.override_path = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }
}

/// Errors surfaced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to resolve working directory {attempted}: {source}")]
    WorkingDirectory {
        attempted: PathBuf,
        source: io::Error,
    },
    #[error("override config {path} not found")]
    OverrideNotFound { path: PathBuf },
    #[error("failed to read config {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("configuration validation failed:\n{0}")]
    Validation(ConfigValidationErrors),
}

impl Config {
    /// Loads configuration using the precedence rules and returns typed settings.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let working_dir = resolve_working_dir(options.working_dir)?;
        let override_path = options
            .override_path
            .map(|path| make_absolute(&path, &working_dir));

        if let Some(path) = &override_path {
            if !path.exists() {
                return Err(ConfigError::OverrideNotFound { path: path.clone() });
            }
        }

        let default_source = ConfigSource::default(working_dir.clone());
        let mut merged = PartialConfig::default();
        merged.merge(defaults_layer(default_source.clone()));

        let mut source_layers = vec![default_source];

        let local_config_path = working_dir.join(CONFIG_FILE_NAME);
        if local_config_path.exists() && Some(&local_config_path) != override_path.as_ref() {
            let source = ConfigSource::for_file(ConfigSourceKind::Local, local_config_path.clone());
            merged.merge(load_layer(&local_config_path, source.clone())?);
            source_layers.push(source);
        }

        if let Some(path) = override_path {
            let source = ConfigSource::for_file(ConfigSourceKind::Override, path.clone());
            merged.merge(load_layer(&path, source.clone())?);
            source_layers.push(source);
        }

        let config = merged.finalize().map_err(ConfigError::Validation)?;
        Ok(Config {
            paths: config.paths,
            publication: config.publication,
            module: config.module,
            descriptor: config.descriptor,
            sources: ConfigSources {
                working_directory: working_dir,
                layers: source_layers,
            },
        })
    }

    /// Configuration file that supplied the highest-precedence layer, if any.
    pub fn origin(&self) -> Option<&Path> {
        self.sources
            .layers
            .iter()
            .rev()
            .find_map(|layer| layer.path.as_deref())
    }
}

fn resolve_working_dir(override_dir: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    match override_dir {
        Some(path) => fs::canonicalize(&path).map_err(|source| ConfigError::WorkingDirectory {
            attempted: path,
            source,
        }),
        None => env::current_dir().map_err(|source| ConfigError::WorkingDirectory {
            attempted: PathBuf::from("."),
            source,
        }),
    }
}

fn make_absolute(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn load_layer(path: &Path, source: ConfigSource) -> Result<PartialConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.into(),
        source,
    })?;
    let raw: RawConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.into(),
        source,
    })?;
    Ok(raw.into_partial(source))
}

fn defaults_layer(source: ConfigSource) -> PartialConfig {
    let located = |value| Some(Located::new(value, source.clone()));

    PartialConfig {
        apache_config: located(PathBuf::from("/etc/apache2/conf-enabled/1c.conf")),
        vrd_dir: located(PathBuf::from("/var/www/1c/vrd")),
        publication_root: located(PathBuf::from("/var/www/1c/pub")),
        templates: None,
        url_base: Some(Located::new("/1c".to_string(), source.clone())),
        backup: Some(Located::new(false, source.clone())),
        platform_path: located(PathBuf::from("/opt/1cv8/x86_64/current")),
        ws_module: Some(Located::new("wsap24.so".to_string(), source.clone())),
        server_addr: Some(Located::new("localhost".to_string(), source.clone())),
        debug: None,
        params: BTreeMap::new(),
    }
}

#[derive(Clone, Debug)]
struct Located<T> {
    value: T,
    source: ConfigSource,
}

impl<T> Located<T> {
    fn new(value: T, source: ConfigSource) -> Self {
        Located { value, source }
    }
}

fn resolve_path(located: &Located<PathBuf>) -> PathBuf {
    let path = &located.value;
    if path.is_absolute() {
        path.clone()
    } else {
        located.source.base_dir.join(path)
    }
}

#[derive(Clone, Debug, Default)]
struct PartialConfig {
    apache_config: Option<Located<PathBuf>>,
    vrd_dir: Option<Located<PathBuf>>,
    publication_root: Option<Located<PathBuf>>,
    templates: Option<Located<PathBuf>>,
    url_base: Option<Located<String>>,
    backup: Option<Located<bool>>,
    platform_path: Option<Located<PathBuf>>,
    ws_module: Option<Located<String>>,
    server_addr: Option<Located<String>>,
    debug: Option<Located<String>>,
    params: BTreeMap<String, Located<String>>,
}

macro_rules! take_newer {
    ($self:ident, $other:ident, $($field:ident),+ $(,)?) => {
        $(
            if $other.$field.is_some() {
                $self.$field = $other.$field;
            }
        )+
    };
}

impl PartialConfig {
    fn merge(&mut self, other: PartialConfig) {
        take_newer!(
            self,
            other,
            apache_config,
            vrd_dir,
            publication_root,
            templates,
            url_base,
            backup,
            platform_path,
            ws_module,
            server_addr,
            debug,
        );
        for (key, value) in other.params {
            self.params.insert(key, value);
        }
    }

    fn finalize(self) -> Result<ResolvedConfig, ConfigValidationErrors> {
        let mut errors = Vec::new();
        let fallback = || ConfigSource::default(PathBuf::from("."));

        let apache_config = required_path(self.apache_config, "paths.apache_config", &mut errors);
        let vrd_dir = required_path(self.vrd_dir, "paths.vrd_dir", &mut errors);
        let publication_root =
            required_path(self.publication_root, "paths.publication_root", &mut errors);
        let templates = self.templates.as_ref().map(resolve_path);

        let url_base = self
            .url_base
            .unwrap_or_else(|| Located::new("/1c".to_string(), fallback()));
        if let Err(reason) = check_url_base(&url_base.value) {
            errors.push(
                ConfigValidationError::new(
                    Some(url_base.source.clone()),
                    format!("'{}' {reason}", url_base.value),
                )
                .with_context("publication.url_base"),
            );
        }

        let ws_module = self
            .ws_module
            .unwrap_or_else(|| Located::new(String::new(), fallback()));
        if ws_module.value.trim().is_empty() {
            errors.push(
                ConfigValidationError::new(Some(ws_module.source.clone()), "cannot be empty".into())
                    .with_context("module.ws_module"),
            );
        }
        let platform_path = required_path(self.platform_path, "module.platform_path", &mut errors);

        let mut params = BTreeMap::new();
        for (key, located) in self.params {
            if let Err(reason) = check_param_key(&key) {
                errors.push(
                    ConfigValidationError::new(Some(located.source.clone()), reason)
                        .with_context(format!("descriptor.params.{key}")),
                );
                continue;
            }
            params.insert(key, located.value);
        }

        if !errors.is_empty() {
            return Err(ConfigValidationErrors(errors));
        }

        Ok(ResolvedConfig {
            paths: PathSettings {
                apache_config,
                vrd_dir,
                publication_root,
                templates,
            },
            publication: PublicationSettings {
                url_base: url_base.value,
                backup: self.backup.map(|located| located.value).unwrap_or(false),
            },
            module: ModuleSettings {
                platform_path,
                ws_module: ws_module.value,
            },
            descriptor: DescriptorSettings {
                server_addr: self
                    .server_addr
                    .map(|located| located.value)
                    .filter(|value| !value.is_empty()),
                debug: self
                    .debug
                    .map(|located| located.value)
                    .filter(|value| !value.is_empty()),
                params,
            },
        })
    }
}

struct ResolvedConfig {
    paths: PathSettings,
    publication: PublicationSettings,
    module: ModuleSettings,
    descriptor: DescriptorSettings,
}

fn required_path(
    located: Option<Located<PathBuf>>,
    context: &str,
    errors: &mut Vec<ConfigValidationError>,
) -> PathBuf {
    match located {
        Some(located) if !located.value.as_os_str().is_empty() => resolve_path(&located),
        Some(located) => {
            errors.push(
                ConfigValidationError::new(Some(located.source), "cannot be empty".into())
                    .with_context(context),
            );
            PathBuf::new()
        }
        None => {
            errors.push(ConfigValidationError::new(None, "is required".into()).with_context(context));
            PathBuf::new()
        }
    }
}

fn check_url_base(value: &str) -> Result<(), &'static str> {
    if !value.starts_with('/') {
        return Err("must start with '/'");
    }
    for segment in value.split('/').filter(|segment| !segment.is_empty()) {
        if segment == "." || segment == ".." {
            return Err("cannot contain relative segments");
        }
        if segment
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control() || "\"'<>#?%\\`".contains(ch))
        {
            return Err("contains characters that are not allowed in a URL path");
        }
    }
    Ok(())
}

fn check_param_key(key: &str) -> Result<(), String> {
    let mut chars = key.chars();
    let valid_start = chars
        .next()
        .map(|ch| ch.is_ascii_alphabetic() || ch == '_')
        .unwrap_or(false);
    if !valid_start || !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(format!("'{key}' is not a valid template parameter name"));
    }
    if RESERVED_PARAM_KEYS.contains(&key) {
        return Err(format!("'{key}' is reserved by the descriptor renderer"));
    }
    Ok(())
}

/// Aggregated validation failures.
#[derive(Clone, Debug)]
pub struct ConfigValidationErrors(pub Vec<ConfigValidationError>);

impl fmt::Display for ConfigValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.0.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "- {err}")?;
        }
        Ok(())
    }
}

impl ConfigValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ConfigValidationError> {
        self.0.iter()
    }
}

/// Validation failure with optional provenance.
#[derive(Clone, Debug)]
pub struct ConfigValidationError {
    pub source: Option<ConfigSource>,
    pub message: String,
    pub context: Option<String>,
}

impl ConfigValidationError {
    fn new(source: Option<ConfigSource>, message: String) -> Self {
        ConfigValidationError {
            source,
            message,
            context: None,
        }
    }

    fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{}: {}", context, self.message)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if let Some(source) = &self.source {
            write!(f, " ({})", source.describe())?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    paths: Option<RawPaths>,
    #[serde(default)]
    publication: Option<RawPublication>,
    #[serde(default)]
    module: Option<RawModule>,
    #[serde(default)]
    descriptor: Option<RawDescriptor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPaths {
    apache_config: Option<PathBuf>,
    vrd_dir: Option<PathBuf>,
    publication_root: Option<PathBuf>,
    templates: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPublication {
    url_base: Option<String>,
    backup: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawModule {
    platform_path: Option<PathBuf>,
    ws_module: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDescriptor {
    server_addr: Option<String>,
    debug: Option<String>,
    #[serde(default)]
    params: BTreeMap<String, String>,
}

impl RawConfig {
    fn into_partial(self, source: ConfigSource) -> PartialConfig {
        let at = |value| Located::new(value, source.clone());
        let paths = self.paths.unwrap_or_default();
        let publication = self.publication.unwrap_or_default();
        let module = self.module.unwrap_or_default();
        let descriptor = self.descriptor.unwrap_or_default();

        PartialConfig {
            apache_config: paths.apache_config.map(at),
            vrd_dir: paths.vrd_dir.map(at),
            publication_root: paths.publication_root.map(at),
            templates: paths.templates.map(at),
            url_base: publication
                .url_base
                .map(|value| Located::new(value, source.clone())),
            backup: publication
                .backup
                .map(|value| Located::new(value, source.clone())),
            platform_path: module.platform_path.map(at),
            ws_module: module
                .ws_module
                .map(|value| Located::new(value, source.clone())),
            server_addr: descriptor
                .server_addr
                .map(|value| Located::new(value, source.clone())),
            debug: descriptor
                .debug
                .map(|value| Located::new(value, source.clone())),
            params: descriptor
                .params
                .into_iter()
                .map(|(key, value)| (key, Located::new(value, source.clone())))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_base_must_be_rooted() {
        assert!(check_url_base("/1c").is_ok());
        assert!(check_url_base("/srv/1c/").is_ok());
        assert!(check_url_base("1c").is_err());
        assert!(check_url_base("/1c/../etc").is_err());
        assert!(check_url_base("/1c base").is_err());
    }

    #[test]
    fn param_keys_cannot_shadow_context() {
        assert!(check_param_key("pool_size").is_ok());
        assert!(check_param_key("url_path").is_err());
        assert!(check_param_key("9lives").is_err());
        assert!(check_param_key("has-dash").is_err());
    }
}
