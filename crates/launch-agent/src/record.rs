//! On-disk mobile deployment record.
//!
//! Lets `mobile status|recover|stop` run in a later process than the one
//! that deployed. The record is advisory: `active` is the last value this
//! agent claimed, and status checks reconcile it against the tunnel
//! provider before it is trusted.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use planner::MobileDeployment;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RECORD_FILE: &str = ".launch-agent/mobile.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileRecord {
    pub deployment: MobileDeployment,
    /// Last self-reported tunnel state.
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl MobileRecord {
    pub fn new(deployment: MobileDeployment) -> Self {
        Self {
            deployment,
            active: true,
            updated_at: Utc::now(),
        }
    }

    pub fn tunnel_id(&self) -> &str {
        &self.deployment.tunnel.id
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.updated_at = Utc::now();
    }

    /// Write pretty JSON via a sibling temp file and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = tmp_path(path);
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move record into {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("No mobile record at {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt mobile record {}", path.display()))
    }

    /// Remove the record; a missing file is not an error.
    pub fn remove(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
