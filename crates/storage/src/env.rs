// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment flags recognized by the storage layer

/// Truthy check shared by the SWARM_* flags.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// `SWARM_STRICT_ENVELOPE_VALIDATION`: raise on envelope schema violations
/// instead of logging warnings.
pub fn strict_envelope_validation() -> bool {
    env_flag("SWARM_STRICT_ENVELOPE_VALIDATION")
}
