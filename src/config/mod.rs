//! Configuration.
//!
//! Tiers, lowest priority first:
//! 1. **Defaults** - built into the binary
//! 2. **Project** - `$CWD/mission-control/config.yaml`
//! 3. **User** - `~/.mission-control/config.yaml`
//! 4. **Environment** - see below
//!
//! Command-line flags are applied on top by the binary.
//!
//! ## Environment Variables
//! - `MISSION_CONTROL_CONFIG` - Explicit config file (replaces the file tiers)
//! - `MISSION_CONTROL_DB_PATH` - Database path
//! - `MISSION_CONTROL_PORT` - REST server port
//! - `OPENCLAW_GATEWAY_URL` - Gateway endpoint
//! - `OPENCLAW_GATEWAY_TOKEN` - Gateway bearer token

mod loader;
mod types;

pub use loader::{ConfigLoader, ConfigPaths};
pub use types::*;
