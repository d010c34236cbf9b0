// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment flags recognized by the projection layer

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// `SWARM_DB_PROJECTION_STRICT`: raise on any direct projection write
/// outside the ingest bracket.
pub fn projection_strict() -> bool {
    env_flag("SWARM_DB_PROJECTION_STRICT")
}

/// `SWARM_DB_PROJECTION_ONLY`: silently drop direct projection writes.
/// This is also the default behavior; the flag makes it explicit.
pub fn projection_only() -> bool {
    env_flag("SWARM_DB_PROJECTION_ONLY")
}
