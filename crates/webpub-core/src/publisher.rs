//! Publication lifecycle over the server config, descriptors and working
//! directories.
//!
//! Every operation validates its inputs and renders all new content before
//! touching the filesystem. Writes then happen in a fixed order and a failed
//! step undoes the steps before it, so an operation either lands completely
//! or leaves the previous state behind.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use webpub_config::Config;

use crate::block::{BlockSpec, ConfigBlock, BLOCK_TEMPLATE_NAME};
use crate::descriptor::{
    self, descriptor_path, ConnectionTarget, Descriptor, DescriptorParams,
    DESCRIPTOR_TEMPLATE_NAME,
};
use crate::diff::build_unified_diff;
use crate::document::ConfigDocument;
use crate::error::{PublishError, PublishResult};
use crate::fs::{FsStorage, Storage};
use crate::module::{ensure_module, has_module};
use crate::naming::{
    check_config_value, normalize_name, url_segment, validate_url, PublicationName,
};
use crate::template::{Syntax, Template};

#[derive(Debug, Clone, Default)]
pub struct AddRequest {
    /// Infobase name; also the source of the publication name when `name`
    /// is not given.
    pub infobase: String,
    pub name: Option<String>,
    pub url: Option<String>,
    /// Publishes a file infobase at this path instead of a server one.
    pub file: Option<PathBuf>,
    pub server: Option<String>,
    pub force: bool,
    pub dry_run: bool,
}

impl AddRequest {
    pub fn new(infobase: impl Into<String>) -> Self {
        Self {
            infobase: infobase.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub purge_directory: bool,
    /// Together with `purge_directory`, deletes the directory with its contents.
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub name: Option<String>,
    pub url: Option<String>,
    pub changed: bool,
    /// Unified diff of the server config, when it changes.
    pub diff: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publication {
    pub name: String,
    pub url: String,
    pub target: ConnectionTarget,
    pub descriptor: PathBuf,
    pub directory: Option<PathBuf>,
    pub descriptor_present: bool,
    pub directory_present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckItem {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub items: Vec<CheckItem>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.items.iter().all(|item| item.ok)
    }

    fn push(&mut self, name: &'static str, ok: bool, detail: impl Into<String>) {
        self.items.push(CheckItem {
            name,
            ok,
            detail: detail.into(),
        });
    }
}

pub struct Publisher<S = FsStorage> {
    config: Config,
    storage: S,
    descriptor_template: Template,
    block_template: Template,
    params: DescriptorParams,
}

impl Publisher<FsStorage> {
    pub fn new(config: Config) -> PublishResult<Self> {
        Self::with_storage(config, FsStorage)
    }
}

impl<S: Storage> Publisher<S> {
    pub fn with_storage(config: Config, storage: S) -> PublishResult<Self> {
        let descriptor_template = load_template(
            &storage,
            config.paths.templates.as_deref(),
            DESCRIPTOR_TEMPLATE_NAME,
            Syntax::Xml,
        )?
        .unwrap_or_else(descriptor::default_template);
        let block_template = load_template(
            &storage,
            config.paths.templates.as_deref(),
            BLOCK_TEMPLATE_NAME,
            Syntax::ServerConfig,
        )?
        .unwrap_or_else(ConfigBlock::default_template);
        let params = DescriptorParams::from(&config.descriptor);

        Ok(Self {
            config,
            storage,
            descriptor_template,
            block_template,
            params,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn add(&self, request: AddRequest) -> PublishResult<Outcome> {
        let name = match &request.name {
            Some(name) => PublicationName::parse(name)?,
            None => normalize_name(&request.infobase)?,
        };
        let url_base = &self.config.publication.url_base;
        let segment = request
            .url
            .as_deref()
            .map(|url| url_segment(url_base, url))
            .unwrap_or(name.as_str());
        let url = validate_url(segment)?.rooted(url_base);

        let target = match &request.file {
            Some(path) => {
                check_config_value("infobase file", &path.to_string_lossy())?;
                ConnectionTarget::File { path: path.clone() }
            }
            None => {
                check_config_value("infobase", &request.infobase)?;
                if let Some(server) = &request.server {
                    check_config_value("server", server)?;
                }
                ConnectionTarget::Server {
                    infobase: request.infobase.clone(),
                    server: request.server.clone(),
                }
            }
        };

        let directory = self.config.paths.publication_root.join(name.as_str());
        let descriptor = descriptor_path(&self.config.paths.vrd_dir, name.as_str());
        check_config_value("directory", &directory.to_string_lossy())?;
        check_config_value("descriptor", &descriptor.to_string_lossy())?;

        let (text, doc) = self.load_document()?;
        if doc.find(name.as_str()).is_some() && !request.force {
            return Err(PublishError::DuplicateName {
                name: name.to_string(),
            });
        }
        if let Some(owner) = doc.owner_of_url(&url).filter(|owner| *owner != name.as_str()) {
            return Err(PublishError::DuplicateUrl {
                url,
                owner: owner.to_string(),
            });
        }
        if !request.force {
            for path in [&descriptor, &directory] {
                if self.storage.exists(path) {
                    return Err(PublishError::ArtifactExists {
                        name: name.to_string(),
                        path: path.clone(),
                    });
                }
            }
        }

        let rendered = self.render_descriptor(descriptor.clone(), &target, &url)?;
        let block = ConfigBlock::render(
            &BlockSpec {
                name: &name,
                url: &url,
                directory: &directory,
                descriptor: &descriptor,
                target: &target,
            },
            &self.block_template,
        )?;
        let new_text = doc.upsert(block)?.serialize();
        let previous_descriptor = self.read(&descriptor)?;

        let outcome = Outcome {
            name: Some(name.to_string()),
            url: Some(url.clone()),
            changed: new_text != text
                || previous_descriptor.as_deref() != Some(rendered.content.as_str()),
            diff: build_unified_diff(&text, &new_text, &self.config.paths.apache_config),
        };
        if request.dry_run {
            return Ok(outcome);
        }

        let created_dir = !self.storage.exists(&directory);
        if created_dir {
            self.storage
                .create_dir(&directory)
                .map_err(|err| PublishError::io(&directory, err))?;
        }

        let written = self
            .storage
            .write_atomic(&descriptor, &rendered.content, false)
            .map_err(|err| PublishError::io(&descriptor, err))
            .and_then(|()| self.write_document(&new_text));
        if let Err(err) = written {
            self.restore_descriptor(&descriptor, previous_descriptor.as_deref());
            if created_dir {
                if let Err(cleanup) = self.storage.remove_dir(&directory) {
                    warn!(path = %directory.display(), error = %cleanup, "failed to remove directory during rollback");
                }
            }
            return Err(err);
        }

        info!(publication = %name, url = %url, "publication added");
        Ok(outcome)
    }

    pub fn remove(&self, name: &str, options: RemoveOptions) -> PublishResult<Outcome> {
        let (text, doc) = self.load_document()?;
        let block = doc
            .find(name)
            .ok_or_else(|| PublishError::NotFound {
                name: name.to_string(),
            })?
            .clone();
        let directory = self.directory_of(&block);

        if options.purge_directory && !options.force && self.storage.exists(&directory) {
            let empty = self
                .storage
                .is_empty_dir(&directory)
                .map_err(|err| PublishError::io(&directory, err))?;
            if !empty {
                return Err(PublishError::io(
                    &directory,
                    io::Error::other("directory is not empty; pass force to delete its contents"),
                ));
            }
        }

        let new_text = doc.remove(name).serialize();
        let outcome = Outcome {
            name: Some(block.name().to_string()),
            url: Some(block.url().to_string()),
            changed: true,
            diff: build_unified_diff(&text, &new_text, &self.config.paths.apache_config),
        };
        if options.dry_run {
            return Ok(outcome);
        }

        self.write_document(&new_text)?;

        match self.storage.remove_file(block.descriptor()) {
            Ok(()) => debug!(path = %block.descriptor().display(), "descriptor deleted"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(publication = %name, path = %block.descriptor().display(), "descriptor already absent")
            }
            Err(err) => {
                warn!(publication = %name, path = %block.descriptor().display(), error = %err, "failed to delete descriptor")
            }
        }

        if options.purge_directory && self.storage.exists(&directory) {
            let removed = if options.force {
                self.storage.remove_dir_all(&directory)
            } else {
                self.storage.remove_dir(&directory)
            };
            removed.map_err(|err| PublishError::io(&directory, err))?;
            debug!(path = %directory.display(), "publication directory deleted");
        }

        info!(publication = %name, "publication removed");
        Ok(outcome)
    }

    pub fn set_url(&self, name: &str, url: &str, dry_run: bool) -> PublishResult<Outcome> {
        let url_base = &self.config.publication.url_base;
        let url = validate_url(url_segment(url_base, url))?.rooted(url_base);

        let (text, doc) = self.load_document()?;
        let block = doc.find(name).ok_or_else(|| PublishError::NotFound {
            name: name.to_string(),
        })?;
        let moved = block.with_url(&url);
        let rendered =
            self.render_descriptor(moved.descriptor().to_path_buf(), moved.target(), &url)?;
        let new_text = doc.upsert(moved)?.serialize();

        let previous_descriptor = self.read(&rendered.path)?;
        let config_changed = new_text != text;
        let descriptor_changed =
            previous_descriptor.as_deref() != Some(rendered.content.as_str());

        let outcome = Outcome {
            name: Some(name.to_string()),
            url: Some(url.clone()),
            changed: config_changed || descriptor_changed,
            diff: build_unified_diff(&text, &new_text, &self.config.paths.apache_config),
        };
        if dry_run {
            return Ok(outcome);
        }

        if config_changed {
            self.write_document(&new_text)?;
        }
        if descriptor_changed {
            let written = self
                .storage
                .write_atomic(&rendered.path, &rendered.content, false);
            if let Err(err) = written {
                if config_changed {
                    if let Err(restore) = self.write_document(&text) {
                        warn!(error = %restore, "failed to restore server config");
                    }
                }
                return Err(PublishError::io(&rendered.path, err));
            }
        }

        if outcome.changed {
            info!(publication = %name, url = %url, "publication url updated");
        }
        Ok(outcome)
    }

    pub fn get(&self, name: &str) -> PublishResult<Publication> {
        let (_, doc) = self.load_document()?;
        doc.find(name)
            .map(|block| self.publication(block))
            .ok_or_else(|| PublishError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn list(&self) -> PublishResult<Vec<Publication>> {
        let (_, doc) = self.load_document()?;
        Ok(doc.blocks().map(|block| self.publication(block)).collect())
    }

    pub fn has_module(&self) -> PublishResult<bool> {
        let (_, doc) = self.load_document()?;
        Ok(has_module(&doc))
    }

    pub fn add_module(&self, dry_run: bool) -> PublishResult<Outcome> {
        let module_path = self.config.module.module_path();
        check_config_value("module path", &module_path.to_string_lossy())?;

        let (text, doc) = self.load_document()?;
        let new_text = ensure_module(&doc, &module_path).serialize();
        let outcome = Outcome {
            changed: new_text != text,
            diff: build_unified_diff(&text, &new_text, &self.config.paths.apache_config),
            ..Outcome::default()
        };
        if dry_run || !outcome.changed {
            return Ok(outcome);
        }

        self.write_document(&new_text)?;
        info!(module = %module_path.display(), "web-service module enabled");
        Ok(outcome)
    }

    pub fn check(&self) -> CheckReport {
        let mut report = CheckReport::default();
        let paths = &self.config.paths;

        let document = match self.load_document() {
            Ok((_, doc)) if self.storage.exists(&paths.apache_config) => {
                report.push(
                    "apache_config",
                    true,
                    format!(
                        "{} ({} publications)",
                        paths.apache_config.display(),
                        doc.blocks().count()
                    ),
                );
                Some(doc)
            }
            Ok(_) => {
                report.push(
                    "apache_config",
                    false,
                    format!("{} does not exist", paths.apache_config.display()),
                );
                None
            }
            Err(err) => {
                report.push("apache_config", false, err.to_string());
                None
            }
        };

        for (name, path) in [
            ("vrd_dir", &paths.vrd_dir),
            ("publication_root", &paths.publication_root),
        ] {
            let ok = self.storage.exists(path);
            let detail = if ok {
                path.display().to_string()
            } else {
                format!("{} does not exist", path.display())
            };
            report.push(name, ok, detail);
        }

        let url_base = &self.config.publication.url_base;
        let invalid_segment = url_base
            .split('/')
            .filter(|segment| !segment.is_empty())
            .find_map(|segment| validate_url(segment).err());
        match invalid_segment {
            Some(err) => report.push("url_base", false, err.to_string()),
            None if url_base.starts_with('/') => report.push("url_base", true, url_base.clone()),
            None => report.push("url_base", false, format!("'{url_base}' must start with '/'")),
        }

        let module_path = self.config.module.module_path();
        let module_present = self.storage.exists(&module_path);
        report.push(
            "module_file",
            module_present,
            if module_present {
                module_path.display().to_string()
            } else {
                format!("{} does not exist", module_path.display())
            },
        );

        match document {
            Some(doc) if has_module(&doc) => report.push("module_directive", true, "present"),
            Some(_) => report.push("module_directive", false, "LoadModule _1cws_module is missing"),
            None => report.push("module_directive", false, "server config unavailable"),
        }

        report
    }

    fn render_descriptor(
        &self,
        path: PathBuf,
        target: &ConnectionTarget,
        url: &str,
    ) -> PublishResult<Descriptor> {
        let content = descriptor::render(&self.descriptor_template, target, url, &self.params)?;
        Ok(Descriptor { path, content })
    }

    fn publication(&self, block: &ConfigBlock) -> Publication {
        let directory = block.directory().map(Path::to_path_buf);
        Publication {
            name: block.name().to_string(),
            url: block.url().to_string(),
            target: block.target().clone(),
            descriptor: block.descriptor().to_path_buf(),
            descriptor_present: self.storage.exists(block.descriptor()),
            directory_present: directory
                .as_deref()
                .is_some_and(|path| self.storage.exists(path)),
            directory,
        }
    }

    fn directory_of(&self, block: &ConfigBlock) -> PathBuf {
        block
            .directory()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.paths.publication_root.join(block.name()))
    }

    /// A missing server config reads as an empty document.
    fn load_document(&self) -> PublishResult<(String, ConfigDocument)> {
        let path = &self.config.paths.apache_config;
        let text = self.read(path)?.unwrap_or_default();
        let doc = ConfigDocument::parse(&text).map_err(|source| PublishError::MalformedConfig {
            path: path.clone(),
            source,
        })?;
        Ok((text, doc))
    }

    fn write_document(&self, text: &str) -> PublishResult<()> {
        let path = &self.config.paths.apache_config;
        self.storage
            .write_atomic(path, text, self.config.publication.backup)
            .map_err(|err| PublishError::io(path, err))?;
        debug!(path = %path.display(), "server config written");
        Ok(())
    }

    fn read(&self, path: &Path) -> PublishResult<Option<String>> {
        self.storage
            .read(path)
            .map_err(|err| PublishError::io(path, err))
    }

    fn restore_descriptor(&self, path: &Path, previous: Option<&str>) {
        let restored = match previous {
            Some(content) => self.storage.write_atomic(path, content, false),
            None if self.storage.exists(path) => self.storage.remove_file(path),
            None => Ok(()),
        };
        if let Err(err) = restored {
            warn!(path = %path.display(), error = %err, "failed to restore descriptor during rollback");
        }
    }
}

fn load_template<S: Storage>(
    storage: &S,
    dir: Option<&Path>,
    name: &str,
    syntax: Syntax,
) -> PublishResult<Option<Template>> {
    let Some(dir) = dir else {
        return Ok(None);
    };
    let path = dir.join(name);
    match storage
        .read(&path)
        .map_err(|err| PublishError::io(&path, err))?
    {
        Some(source) => {
            debug!(path = %path.display(), "using custom template");
            Template::parse(name, syntax, &source).map(Some)
        }
        None => Ok(None),
    }
}
