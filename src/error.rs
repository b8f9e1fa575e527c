use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or resolving a launch plan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// A package is not registered in any ament prefix.
    #[error("package '{package}' not found")]
    ResourceNotFound { package: String },

    #[error("executable '{executable}' not found in package '{package}' (looked at {})", path.display())]
    ExecutableNotFound {
        package: String,
        executable: String,
        path: PathBuf,
    },

    /// A command line launch argument is not of the form `name:=value`.
    #[error("invalid launch argument '{0}': expected name:=value")]
    InvalidArgument(String),

    #[error("launch configuration '{0}' is not set")]
    UndefinedConfiguration(String),

    #[error("unknown farm size '{0}'")]
    UnknownFarmSize(String),

    #[error("AMENT_PREFIX_PATH is not set")]
    AmentPrefixPathUnset,
}
