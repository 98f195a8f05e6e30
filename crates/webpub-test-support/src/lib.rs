//! Shared test harness utilities for webpub crates.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use webpub_config::{Config, LoadOptions, CONFIG_FILE_NAME};

const SANDBOX_CONFIG: &str = r#"[paths]
apache_config = "apache/1c.conf"
vrd_dir = "vrd"
publication_root = "pub"
templates = "templates"

[module]
platform_path = "platform"
ws_module = "wsap24.so"

[descriptor]
server_addr = "localhost"
"#;

/// A throwaway installation: server config, descriptor and publication
/// directories plus a `webpub1c.toml` pointing at them.
pub struct Sandbox {
    _dir: TempDir,
    root: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create sandbox");
        let root = fs::canonicalize(dir.path()).expect("canonical sandbox path");
        let sandbox = Self { _dir: dir, root };
        for sub in ["apache", "vrd", "pub", "platform"] {
            fs::create_dir_all(sandbox.root().join(sub)).expect("create sandbox dir");
        }
        sandbox.write_config(SANDBOX_CONFIG);
        sandbox
    }

    /// Sandbox whose server config already holds `text`.
    pub fn with_apache_config(text: &str) -> Self {
        let sandbox = Self::new();
        sandbox.write_apache_config(text);
        sandbox
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join(CONFIG_FILE_NAME)
    }

    pub fn apache_config_path(&self) -> PathBuf {
        self.root().join("apache").join("1c.conf")
    }

    pub fn vrd_dir(&self) -> PathBuf {
        self.root().join("vrd")
    }

    pub fn publication_root(&self) -> PathBuf {
        self.root().join("pub")
    }

    pub fn descriptor_path(&self, name: &str) -> PathBuf {
        self.vrd_dir().join(format!("{name}.vrd"))
    }

    pub fn publication_dir(&self, name: &str) -> PathBuf {
        self.publication_root().join(name)
    }

    pub fn module_path(&self) -> PathBuf {
        self.root().join("platform").join("wsap24.so")
    }

    /// Loads the sandbox configuration the same way the CLI does.
    pub fn config(&self) -> Config {
        Config::load(LoadOptions::default().with_working_dir(self.root()))
            .expect("load sandbox config")
    }

    pub fn write_config(&self, contents: &str) {
        fs::write(self.config_path(), contents).expect("write sandbox config");
    }

    pub fn read_apache_config(&self) -> String {
        fs::read_to_string(self.apache_config_path()).unwrap_or_default()
    }

    pub fn write_apache_config(&self, text: &str) {
        fs::write(self.apache_config_path(), text).expect("write apache config");
    }

    pub fn write_template(&self, name: &str, contents: &str) {
        let dir = self.root().join("templates");
        fs::create_dir_all(&dir).expect("create templates dir");
        fs::write(dir.join(name), contents).expect("write template");
    }

    pub fn install_module(&self) {
        fs::write(self.module_path(), b"").expect("write module file");
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a baseline configuration rooted in `sandbox`.
pub fn test_config(sandbox: &Sandbox) -> Config {
    sandbox.config()
}
