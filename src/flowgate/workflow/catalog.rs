// SPDX-License-Identifier: MIT

//! Directory of named workflow definitions (`<dir>/<name>.yaml`)

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::graph::Workflow;
use super::loader::WorkflowLoader;
use crate::flowgate::error::{FlowgateError, Result};

const EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// A definition file found in the catalog directory
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WorkflowCatalog {
    dir: PathBuf,
    loader: WorkflowLoader,
}

impl WorkflowCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loader: WorkflowLoader::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the definition for `name`, if one exists
    pub async fn resolve(&self, name: &str) -> Option<PathBuf> {
        for ext in EXTENSIONS {
            let path = self.dir.join(format!("{}.{}", name, ext));
            if fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
                return Some(path);
            }
        }
        None
    }

    /// Load and validate the workflow called `name`
    pub async fn load(&self, name: &str) -> Result<Workflow> {
        let path = self
            .resolve(name)
            .await
            .ok_or_else(|| FlowgateError::WorkflowNotFound(name.to_string()))?;
        self.loader.load_workflow(path).await
    }

    /// All definition files, sorted by name. A missing directory is empty.
    pub async fn list(&self) -> Result<Vec<CatalogEntry>> {
        let mut entries = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let is_definition = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext));
            if !is_definition {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                entries.push(CatalogEntry {
                    name: stem.to_string(),
                    file: path.clone(),
                });
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
