//! Host platform utility functions

use std::path::PathBuf;

/// Environment variable holding the root directory of the software, which contains the `params`
/// and `sessions` directories.
pub const SW_ROOT_ENV: &str = "ORION_SW_ROOT";

/// Get the software root directory.
pub fn get_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV).map(PathBuf::from)
}
