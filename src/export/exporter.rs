//! Storage-walk materializer
//!
//! Replays a compiled rule against every cached page. Pages whose name does
//! not match the leading token fall out immediately, so walking the whole
//! cache in arbitrary order is cheap; a parent page reached later in the
//! iteration still produces its output when its own turn comes.

use crate::export::rule::{compile_rule, Step};
use crate::export::{ExportError, ExportResult};
use crate::page::Page;
use crate::storage::Storage;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Materializes cached file pages onto the filesystem
pub struct Exporter<S> {
    storage: Arc<S>,
    steps: Vec<Step>,
}

impl<S: Storage> Exporter<S> {
    /// Compiles the rule and binds the exporter to a cache
    ///
    /// # Arguments
    ///
    /// * `storage` - The populated page cache
    /// * `rule` - Path rule, e.g. `out/{album:title}/{track:file}`
    ///
    /// # Returns
    ///
    /// * `Ok(Exporter)` - The rule compiled
    /// * `Err(ExportError)` - The rule contains a malformed token
    pub fn new(storage: Arc<S>, rule: &str) -> ExportResult<Self> {
        let steps = compile_rule(rule)?;
        Ok(Exporter { storage, steps })
    }

    /// Walks the cache and writes every matching branch to disk
    ///
    /// Per-branch failures (missing fields, pages that are not files) are
    /// logged and skipped; other branches continue.
    pub fn export(&self) {
        tracing::info!("exporter: starting with {} steps", self.steps.len());

        for page in self.storage.iterate() {
            self.export_page("", &page, false, &self.steps);
        }
    }

    fn export_page(&self, path: &str, page: &Page, extract_children: bool, steps: &[Step]) {
        let Some(step) = steps.first() else {
            // Path complete: write the file body
            if let Err(e) = self.write_file(path, page) {
                tracing::error!("exporter: error writing {}: {}", path, e);
            }
            return;
        };

        match step {
            Step::Filler(text) => {
                self.export_page(&format!("{path}{text}"), page, extract_children, &steps[1..]);
            }
            Step::Token { name, field } => {
                if extract_children {
                    self.branch_into_children(path, page, name, steps);
                }

                // The walk continues on this page only when it is the kind
                // the token names
                if page.name != *name {
                    return;
                }

                match path_value(page, field) {
                    Ok(value) => {
                        self.export_page(&format!("{path}{value}"), page, true, &steps[1..]);
                    }
                    Err(e) => {
                        tracing::error!(
                            "exporter: error extracting field \"{}\" from {}: {}",
                            field,
                            page.url,
                            e
                        );
                    }
                }
            }
        }
    }

    /// Branches one path per child page stored under the token's field
    ///
    /// A page without that field simply has no children to branch into; a
    /// child missing from storage is logged and skipped.
    fn branch_into_children(&self, path: &str, page: &Page, name: &str, steps: &[Step]) {
        let urls = match extract_field(page, name) {
            Ok(urls) => urls,
            Err(e) => {
                tracing::debug!("exporter: no \"{}\" children under {}: {}", name, page.url, e);
                return;
            }
        };

        for url in urls {
            match self.storage.get(&url) {
                Some(child) => self.export_page(path, &child, false, steps),
                None => tracing::error!("exporter: can't load child page {}", url),
            }
        }
    }

    fn write_file(&self, path: &str, page: &Page) -> ExportResult<()> {
        if !page.is_file {
            return Err(ExportError::NotAFile(page.name.clone()));
        }

        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &page.body)?;

        tracing::info!("exporter: wrote {}", path);
        Ok(())
    }
}

/// Prepares a field value for use as a path segment
fn path_value(page: &Page, field: &str) -> ExportResult<String> {
    match field {
        "ext" => {
            if !page.is_file {
                return Err(ExportError::NotAFile(page.name.clone()));
            }

            let extension = page
                .file_name
                .as_deref()
                .and_then(|name| Path::new(name).extension())
                .and_then(|ext| ext.to_str())
                .unwrap_or("");
            Ok(extension.to_string())
        }

        "file" => {
            if !page.is_file {
                return Err(ExportError::NotAFile(page.name.clone()));
            }
            Ok(page.file_name.clone().unwrap_or_default())
        }

        _ => {
            let values = extract_field(page, field)?;
            Ok(values.join(" ").replace('/', "-"))
        }
    }
}

/// Reads a field's leaf values as strings
fn extract_field(page: &Page, field: &str) -> ExportResult<Vec<String>> {
    let values = page
        .tree
        .as_ref()
        .and_then(|tree| tree.values(field))
        .ok_or_else(|| ExportError::MissingField {
            field: field.to_string(),
            page: page.name.clone(),
        })?;

    values
        .iter()
        .map(|value| {
            value
                .as_text()
                .map(str::to_string)
                .ok_or_else(|| ExportError::NestedBlock(field.to_string()))
        })
        .collect()
}
