//! Drift reconciliation for tunnel status checks.
//!
//! The tunnel provider is authoritative. When it cannot be reached the
//! caller's last self-reported flag is returned with `verified: false`
//! instead of blocking.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelStatus {
    pub active: bool,
    /// `true` when `active` came from the provider rather than the caller.
    pub verified: bool,
}

impl TunnelStatus {
    /// Provider confirmed the tunnel is gone; recovery should run.
    pub fn needs_recovery(&self) -> bool {
        self.verified && !self.active
    }
}

/// Combine a provider presence lookup with the caller's last claim.
pub fn reconcile<E>(lookup: Result<bool, E>, last_claimed_active: bool) -> TunnelStatus {
    match lookup {
        Ok(present) => TunnelStatus {
            active: present,
            verified: true,
        },
        Err(_) => TunnelStatus {
            active: last_claimed_active,
            verified: false,
        },
    }
}
