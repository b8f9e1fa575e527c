//! Assembly of the tomato farm launch plan.
//!
//! [`build_plan`] resolves package locations, picks the world file and
//! computes the model search path overlay. It returns a [`LaunchPlan`]
//! value and leaves the process environment untouched.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::ament::Env;
use crate::error::LaunchError;
use crate::farm::FarmSize;
use crate::launch::{LaunchArg, LaunchConfigurations, Substitution};
use crate::overlay::{EnvOverlay, GZ_SIM_RESOURCE_PATH};

pub const ROS_GZ_SIM_PACKAGE: &str = "ros_gz_sim";
pub const FARM_PACKAGE: &str = "tomato_farm_simulator";
pub const BRIDGE_PACKAGE: &str = "ros_gz_bridge";
pub const BRIDGE_EXECUTABLE: &str = "parameter_bridge";
/// Bridges `/clock` from Gazebo to ROS 2 only.
pub const CLOCK_BRIDGE: &str = "/clock@rosgraph_msgs/msg/Clock[gz.msgs.Clock";

pub const WORLD_FILE: &str = "tomato_farm_simple.world";
pub const FALLBACK_WORLD_FILE: &str = "empty.world";

/// A unit of work for the launcher. Output of spawned processes is printed on
/// the launcher's terminal and copied to a per-process log file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    DeclareArgument(LaunchArg),
    /// Runs an arbitrary command found on `PATH`.
    ExecuteProcess { cmd: Vec<Substitution> },
    /// Runs an executable installed by a ROS 2 package.
    Node {
        package: String,
        executable: String,
        arguments: Vec<Substitution>,
    },
}

/// A process ready to spawn, with every substitution performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedProcess {
    /// Display name, `<basename>-<n>`.
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchPlan {
    pub farm: FarmSize,
    /// World file used as the default of the `world` argument.
    pub world_path: PathBuf,
    /// Directory holding the selected farm's models.
    pub model_path: PathBuf,
    pub overlay: EnvOverlay,
    pub actions: Vec<Action>,
}

/// Builds the plan against the current value of `GZ_SIM_RESOURCE_PATH`.
pub fn build_plan(env: &Env, farm: FarmSize) -> Result<LaunchPlan, LaunchError> {
    let existing = std::env::var(GZ_SIM_RESOURCE_PATH).ok();
    build_plan_with_resource_path(env, farm, existing.as_deref())
}

/// Builds the plan, treating `existing_resource_path` as the current
/// `GZ_SIM_RESOURCE_PATH` value.
pub fn build_plan_with_resource_path(
    env: &Env,
    farm: FarmSize,
    existing_resource_path: Option<&str>,
) -> Result<LaunchPlan, LaunchError> {
    // ros_gz_sim is only required to be installed; nothing under it is used.
    env.share_dir(ROS_GZ_SIM_PACKAGE)?;
    let share = env.share_dir(FARM_PACKAGE)?;

    let world_path = select_world(&share);
    let model_path = share.join("models").join(farm.dir_name());
    let overlay = EnvOverlay::compute(&model_path, existing_resource_path);

    tracing::debug!(
        world = %world_path.display(),
        models = %model_path.display(),
        %farm,
        "assembled launch plan"
    );

    let actions = vec![
        Action::DeclareArgument(LaunchArg::new(
            "headless",
            "False",
            "Whether to run headless (no GUI)",
        )),
        Action::DeclareArgument(LaunchArg::new(
            "use_sim_time",
            "true",
            "Use simulation (Gazebo) clock if true",
        )),
        Action::DeclareArgument(LaunchArg::new(
            "world",
            world_path.display().to_string(),
            "Full path to the world model file to load",
        )),
        Action::ExecuteProcess {
            cmd: vec![
                Substitution::text("gz"),
                Substitution::text("sim"),
                Substitution::text("-r"),
                Substitution::configuration("world"),
            ],
        },
        Action::Node {
            package: BRIDGE_PACKAGE.to_string(),
            executable: BRIDGE_EXECUTABLE.to_string(),
            arguments: vec![Substitution::text(CLOCK_BRIDGE)],
        },
    ];

    Ok(LaunchPlan {
        farm,
        world_path,
        model_path,
        overlay,
        actions,
    })
}

/// Picks the farm world, falling back to the empty world when it is missing.
/// The fallback itself is not checked.
fn select_world(share: &Path) -> PathBuf {
    let worlds = share.join("worlds");
    let primary = worlds.join(WORLD_FILE);
    if primary.exists() {
        return primary;
    }
    tracing::warn!(
        missing = %primary.display(),
        "world file not found, falling back to {FALLBACK_WORLD_FILE}"
    );
    worlds.join(FALLBACK_WORLD_FILE)
}

impl LaunchPlan {
    pub fn declared_arguments(&self) -> impl Iterator<Item = &LaunchArg> {
        self.actions.iter().filter_map(|action| match action {
            Action::DeclareArgument(arg) => Some(arg),
            _ => None,
        })
    }

    /// Applies argument overrides to the declared defaults.
    pub fn configurations(&self, overrides: &[(String, String)]) -> LaunchConfigurations {
        let declared: Vec<&LaunchArg> = self.declared_arguments().collect();
        LaunchConfigurations::new(&declared, overrides)
    }

    /// Turns every spawn action into a concrete command line.
    pub fn resolve(
        &self,
        env: &Env,
        configs: &LaunchConfigurations,
    ) -> Result<Vec<ResolvedProcess>, LaunchError> {
        let mut processes = Vec::new();

        for action in &self.actions {
            let (program, args) = match action {
                Action::DeclareArgument(_) => continue,
                Action::ExecuteProcess { cmd } => {
                    let mut parts = cmd
                        .iter()
                        .map(|s| s.perform(configs))
                        .collect::<Result<Vec<_>, _>>()?
                        .into_iter();
                    let Some(program) = parts.next() else {
                        continue;
                    };
                    (PathBuf::from(program), parts.collect())
                }
                Action::Node {
                    package,
                    executable,
                    arguments,
                } => {
                    let program = env.executable_path(package, executable)?;
                    let args = arguments
                        .iter()
                        .map(|s| s.perform(configs))
                        .collect::<Result<Vec<_>, _>>()?;
                    (program, args)
                }
            };

            let basename = program
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| program.display().to_string());
            processes.push(ResolvedProcess {
                name: format!("{}-{}", basename, processes.len() + 1),
                program,
                args,
            });
        }

        Ok(processes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(prefix: &Path, package: &str) -> PathBuf {
        let index = prefix.join("share/ament_index/resource_index/packages");
        std::fs::create_dir_all(&index).unwrap();
        std::fs::write(index.join(package), "").unwrap();
        let share = prefix.join("share").join(package);
        std::fs::create_dir_all(&share).unwrap();
        share
    }

    fn env_for(prefix: &Path) -> Env {
        Env::from_path(&prefix.display().to_string())
    }

    #[test]
    fn select_world_prefers_farm_world() {
        let share = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(share.path().join("worlds")).unwrap();
        std::fs::write(share.path().join("worlds").join(WORLD_FILE), "<sdf/>").unwrap();
        assert_eq!(
            select_world(share.path()),
            share.path().join("worlds").join(WORLD_FILE)
        );
    }

    #[test]
    fn select_world_falls_back_without_checking() {
        let share = tempfile::tempdir().unwrap();
        assert_eq!(
            select_world(share.path()),
            share.path().join("worlds").join(FALLBACK_WORLD_FILE)
        );
    }

    #[test]
    fn model_path_follows_farm_size() {
        let prefix = tempfile::tempdir().unwrap();
        register(prefix.path(), ROS_GZ_SIM_PACKAGE);
        let share = register(prefix.path(), FARM_PACKAGE);

        let plan =
            build_plan_with_resource_path(&env_for(prefix.path()), FarmSize::SixByFour, None)
                .unwrap();
        assert_eq!(plan.model_path, share.join("models").join("6mx4m"));
        assert_eq!(plan.overlay.gazebo_model_path, plan.model_path.display().to_string());
    }

    #[test]
    fn missing_ros_gz_sim_is_fatal() {
        let prefix = tempfile::tempdir().unwrap();
        register(prefix.path(), FARM_PACKAGE);
        let err = build_plan_with_resource_path(&env_for(prefix.path()), FarmSize::default(), None)
            .unwrap_err();
        assert_eq!(
            err,
            LaunchError::ResourceNotFound {
                package: ROS_GZ_SIM_PACKAGE.to_string()
            }
        );
    }

    #[test]
    fn headless_and_use_sim_time_are_not_wired_into_commands() {
        let prefix = tempfile::tempdir().unwrap();
        register(prefix.path(), ROS_GZ_SIM_PACKAGE);
        register(prefix.path(), FARM_PACKAGE);
        let plan = build_plan_with_resource_path(&env_for(prefix.path()), FarmSize::default(), None)
            .unwrap();

        let referenced: Vec<&str> = plan
            .actions
            .iter()
            .flat_map(|action| match action {
                Action::ExecuteProcess { cmd, .. } => cmd.iter().collect::<Vec<_>>(),
                Action::Node { arguments, .. } => arguments.iter().collect(),
                Action::DeclareArgument(_) => Vec::new(),
            })
            .filter_map(|s| match s {
                Substitution::LaunchConfiguration(name) => Some(name.as_str()),
                Substitution::Text(_) => None,
            })
            .collect();
        assert_eq!(referenced, ["world"]);
    }
}
