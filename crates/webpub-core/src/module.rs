use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::document::ConfigDocument;

pub const MODULE_NAME: &str = "_1cws_module";

fn directive() -> &'static Regex {
    static DIRECTIVE: OnceLock<Regex> = OnceLock::new();
    DIRECTIVE.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*LoadModule[ \t]+_1cws_module[ \t]").expect("valid module regex")
    })
}

/// Whether the web-service module is loaded outside of any publication block.
/// Commented-out directives do not count.
pub fn has_module(doc: &ConfigDocument) -> bool {
    doc.passthrough().any(|text| directive().is_match(text))
}

/// Appends the `LoadModule` directive unless it is already present. The
/// module path must already be checked for quoting problems.
pub fn ensure_module(doc: &ConfigDocument, module_path: &Path) -> ConfigDocument {
    if has_module(doc) {
        return doc.clone();
    }
    doc.append_line(&format!(
        "LoadModule {MODULE_NAME} \"{}\"",
        module_path.display()
    ))
}
