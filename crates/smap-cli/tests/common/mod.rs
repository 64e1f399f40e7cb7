#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use std::time::Duration;

pub const CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a configured `smap` command suitable for integration tests.
///
/// Colors are off and no `SMAP_*` variables leak in from the environment.
pub fn smap_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("smap"));
    cmd.timeout(CMD_TIMEOUT);
    for var in [
        "SMAP_OUT",
        "SMAP_BASE_URL",
        "SMAP_CONFIG",
        "SMAP_FORMAT",
        "SMAP_LOG_FORMAT",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}
