use std::path::{Path, PathBuf};

use crate::error::LaunchError;

/// The ament environment, used to locate installed ROS 2 packages.
///
/// Packages are discovered through the ament resource index under each
/// prefix listed in `AMENT_PREFIX_PATH`.
#[derive(Debug, Clone)]
pub struct Env {
    prefixes: Vec<PathBuf>,
}

impl Env {
    /// Creates an ament environment from `AMENT_PREFIX_PATH`.
    pub fn from_env() -> Result<Self, LaunchError> {
        let path =
            std::env::var("AMENT_PREFIX_PATH").map_err(|_| LaunchError::AmentPrefixPathUnset)?;
        Ok(Self::from_path(&path))
    }

    /// Creates an ament environment from a colon-separated prefix path string.
    pub fn from_path(path: &str) -> Self {
        let prefixes = path
            .split(':')
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        Self { prefixes }
    }

    pub fn prefixes(&self) -> &[PathBuf] {
        &self.prefixes
    }

    /// Returns the ament prefix path for a package, or `None` if not found.
    /// Earlier prefixes take priority.
    pub fn package_prefix(&self, name: &str) -> Option<PathBuf> {
        for prefix in &self.prefixes {
            let marker = prefix
                .join("share")
                .join("ament_index")
                .join("resource_index")
                .join("packages")
                .join(name);
            if marker.exists() {
                return Some(prefix.clone());
            }
        }
        None
    }

    /// Returns the installed share directory of a package (`<prefix>/share/<package>`).
    pub fn share_dir(&self, package: &str) -> Result<PathBuf, LaunchError> {
        let prefix = self
            .package_prefix(package)
            .ok_or_else(|| LaunchError::ResourceNotFound {
                package: package.to_string(),
            })?;
        Ok(prefix.join("share").join(package))
    }

    /// Resolves an executable installed by a package (`<prefix>/lib/<package>/<executable>`).
    pub fn executable_path(&self, package: &str, executable: &str) -> Result<PathBuf, LaunchError> {
        let prefix = self
            .package_prefix(package)
            .ok_or_else(|| LaunchError::ResourceNotFound {
                package: package.to_string(),
            })?;
        let path = prefix.join("lib").join(package).join(executable);
        if !path.is_file() || !is_executable(&path) {
            return Err(LaunchError::ExecutableNotFound {
                package: package.to_string(),
                executable: executable.to_string(),
                path,
            });
        }
        Ok(path)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}
