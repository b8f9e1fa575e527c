//! Launcher for the tomato farm simulation: starts Gazebo Harmonic with the
//! farm world and bridges its clock to ROS 2.
//!
//! Building a [`LaunchPlan`] is side-effect free. The caller applies the
//! [`EnvOverlay`] and hands the resolved processes to a [`Launcher`].

/// Ament environment lookup for installed packages and executables.
pub mod ament;
pub mod cli;
pub mod error;
/// Farm layout variants.
pub mod farm;
/// Declared launch arguments, overrides, and substitutions.
pub mod launch;
pub mod logging;
/// Model search path environment overlay.
pub mod overlay;
pub mod plan;
/// Process launching, lifecycle management, and output streaming.
pub mod process;

pub use ament::Env;
pub use error::LaunchError;
pub use farm::FarmSize;
pub use launch::{LaunchArg, LaunchConfigurations, Substitution};
pub use overlay::EnvOverlay;
pub use plan::{Action, LaunchPlan, ResolvedProcess, build_plan};
pub use process::{Launcher, ProcessHandle, ProcessStatus};
