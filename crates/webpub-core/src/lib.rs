//! Registry and config-merge engine for 1C web publications.
//!
//! A publication is an Apache configuration block, a VRD descriptor and a
//! working directory kept consistent with each other. [`Publisher`] drives
//! the lifecycle; the lower modules are usable on their own for tooling that
//! only needs to read or rewrite configuration text.

pub mod block;
pub mod descriptor;
pub mod diff;
pub mod document;
pub mod error;
pub mod fs;
pub mod line;
pub mod module;
pub mod naming;
pub mod publisher;
pub mod template;

pub use block::{BlockSpec, ConfigBlock};
pub use descriptor::{ConnectionTarget, Descriptor, DescriptorParams};
pub use document::ConfigDocument;
pub use error::{ExitCode, MalformedConfig, PublishError, PublishResult};
pub use fs::{FsStorage, Storage};
pub use module::{ensure_module, has_module};
pub use naming::{normalize_name, urlpath_join, validate_url, PublicationName, PublicationUrl};
pub use publisher::{
    AddRequest, CheckItem, CheckReport, Outcome, Publication, Publisher, RemoveOptions,
};
pub use template::{Syntax, Template};
