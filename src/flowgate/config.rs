// SPDX-License-Identifier: MIT

//! Runtime settings resolved from the environment

use std::env;
use std::path::PathBuf;

use crate::flowgate::error::{FlowgateError, Result};

pub const STATE_DIR_VAR: &str = "FLOWGATE_STATE_DIR";
pub const WORKFLOWS_DIR_VAR: &str = "FLOWGATE_WORKFLOWS_DIR";
pub const PORT_VAR: &str = "FLOWGATE_PORT";

pub const DEFAULT_WORKFLOWS_DIR: &str = "workflows";
pub const DEFAULT_PORT: u16 = 3030;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding instance snapshots
    pub state_dir: PathBuf,
    /// Directory searched for `<name>.yaml` workflow definitions
    pub workflows_dir: PathBuf,
    pub port: u16,
}

impl Settings {
    /// Resolve settings from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let state_dir = match non_empty(STATE_DIR_VAR) {
            Some(dir) => PathBuf::from(dir),
            None => default_state_dir(lookup("HOME")),
        };

        let workflows_dir = non_empty(WORKFLOWS_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKFLOWS_DIR));

        let port = match non_empty(PORT_VAR) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                FlowgateError::config(format!("{} must be a port number, got '{}'", PORT_VAR, raw))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            state_dir,
            workflows_dir,
            port,
        })
    }

    /// Apply command-line overrides on top of the environment
    pub fn with_overrides(
        mut self,
        state_dir: Option<PathBuf>,
        workflows_dir: Option<PathBuf>,
        port: Option<u16>,
    ) -> Self {
        if let Some(dir) = state_dir {
            self.state_dir = dir;
        }
        if let Some(dir) = workflows_dir {
            self.workflows_dir = dir;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }
}

fn default_state_dir(home: Option<String>) -> PathBuf {
    let base = home.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    base.join(".flowgate-state")
}
