//! Command-line interface definitions and command handlers.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::ament::Env;
use crate::farm::FarmSize;
use crate::launch::{LaunchConfigurations, parse_override};
use crate::logging::{LogFormat, LoggingConfig};
use crate::plan::{LaunchPlan, ResolvedProcess, build_plan};
use crate::process::{Launcher, ProcessStatus};

/// How long output of stopped processes may keep draining before it is dropped.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Start Gazebo Harmonic with the tomato farm world and bridge /clock to ROS 2.
#[derive(Parser, Debug)]
#[command(name = "tomato-farm-launch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Defaults to `launch` without overrides
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Farm layout whose models are added to the simulator search path
    #[arg(long, global = true, default_value_t = FarmSize::default())]
    pub farm: FarmSize,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the simulator and the clock bridge (default)
    Launch(LaunchArgs),
    /// List the declared launch arguments
    ShowArgs,
    /// Print the launch plan and resolved commands as JSON
    Plan(LaunchArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct LaunchArgs {
    /// Launch argument overrides, e.g. world:=/path/to/farm.world
    #[arg(value_name = "NAME:=VALUE", value_parser = parse_override)]
    pub overrides: Vec<(String, String)>,
}

impl Cli {
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }
}

/// Entry point shared by every subcommand.
pub fn run(cli: Cli) -> Result<()> {
    let env = Env::from_env()?;
    let plan = build_plan(&env, cli.farm).context("Failed to build launch plan")?;

    match cli.command.unwrap_or(Commands::Launch(LaunchArgs::default())) {
        Commands::ShowArgs => {
            show_args(&plan);
            Ok(())
        }
        Commands::Plan(args) => print_plan(&env, &plan, &args.overrides),
        Commands::Launch(args) => launch(&env, &plan, &args.overrides),
    }
}

fn show_args(plan: &LaunchPlan) {
    println!("Arguments (pass arguments as '<name>:=<value>'):\n");
    for arg in plan.declared_arguments() {
        println!("    '{}':", arg.name);
        println!("        {}", arg.description);
        println!("        (default: '{}')\n", arg.default_value);
    }
}

#[derive(Serialize)]
struct PlanReport<'a> {
    plan: &'a LaunchPlan,
    configurations: LaunchConfigurations,
    processes: Vec<ResolvedProcess>,
}

fn print_plan(env: &Env, plan: &LaunchPlan, overrides: &[(String, String)]) -> Result<()> {
    let configurations = plan.configurations(overrides);
    let processes = plan.resolve(env, &configurations)?;
    let report = PlanReport {
        plan,
        configurations,
        processes,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn launch(env: &Env, plan: &LaunchPlan, overrides: &[(String, String)]) -> Result<()> {
    let configurations = plan.configurations(overrides);
    let processes = plan
        .resolve(env, &configurations)
        .context("Failed to resolve launch actions")?;

    // SAFETY: the tokio runtime is not started yet and nothing else has
    // spawned threads, so the environment is not accessed concurrently.
    unsafe { plan.overlay.apply() };

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(async {
        let mut launcher = Launcher::new();
        supervise(&mut launcher, &processes, shutdown_signal(), |line| {
            println!("{line}")
        })
        .await
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Starts every process and prints their output as `[name] line` through `print`.
///
/// Returns once all processes have exited or `shutdown` completes. Whatever is
/// still running is then stopped, and output is drained before returning.
pub async fn supervise<S, P>(
    launcher: &mut Launcher,
    processes: &[ResolvedProcess],
    shutdown: S,
    print: P,
) -> Result<()>
where
    S: Future<Output = ()>,
    P: Fn(String) + Clone + Send + 'static,
{
    let mut printers = JoinSet::new();
    let mut statuses = Vec::new();
    let mut started = Ok(());

    for process in processes {
        let handle = match launcher.start(process).await {
            Ok(handle) => handle,
            Err(e) => {
                started = Err(e);
                break;
            }
        };

        let name = handle.name;
        let print = print.clone();
        let mut output_rx = handle.output_rx;
        printers.spawn(async move {
            while let Some(line) = output_rx.recv().await {
                print(format!("[{name}] {line}"));
            }
        });
        statuses.push(handle.status_rx);
    }

    if started.is_ok() {
        let all_exited = async {
            for status_rx in &mut statuses {
                let _ = status_rx.wait_for(ProcessStatus::has_exited).await;
            }
        };

        tokio::select! {
            _ = all_exited => {
                tracing::info!("all processes have exited");
            }
            _ = shutdown => {
                tracing::warn!("shutdown signal received");
            }
        }
    }

    let stopped = launcher.stop_all().await;

    // Output channels close once both pipes of a process reach EOF.
    let drained = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, async {
        while printers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!("process output still open after shutdown, dropping the rest");
        printers.abort_all();
    }

    started.and(stopped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[test]
    fn bare_invocation_defaults_to_launch() {
        let cli = Cli::try_parse_from(["tomato-farm-launch"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.farm, FarmSize::TwoByThree);
    }

    #[test]
    fn launch_subcommand_collects_overrides() {
        let cli =
            Cli::try_parse_from(["tomato-farm-launch", "launch", "world:=/tmp/x.world"]).unwrap();
        match cli.command {
            Some(Commands::Launch(args)) => assert_eq!(
                args.overrides,
                vec![("world".to_string(), "/tmp/x.world".to_string())]
            ),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn plan_subcommand_accepts_overrides_and_farm() {
        let cli = Cli::try_parse_from([
            "tomato-farm-launch",
            "plan",
            "--farm",
            "4mx3m",
            "headless:=True",
        ])
        .unwrap();
        assert_eq!(cli.farm, FarmSize::FourByThree);
        match cli.command {
            Some(Commands::Plan(args)) => assert_eq!(
                args.overrides,
                vec![("headless".to_string(), "True".to_string())]
            ),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_options_before_subcommand() {
        let cli = Cli::try_parse_from(["tomato-farm-launch", "--farm", "4mx3m", "plan"]).unwrap();
        assert_eq!(cli.farm, FarmSize::FourByThree);
        assert!(matches!(cli.command, Some(Commands::Plan(_))));

        let cli =
            Cli::try_parse_from(["tomato-farm-launch", "--log-level", "debug", "show-args"])
                .unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Some(Commands::ShowArgs)));
    }

    #[test]
    fn malformed_override_is_rejected() {
        assert!(Cli::try_parse_from(["tomato-farm-launch", "launch", "world"]).is_err());
    }

    #[test]
    fn unknown_farm_is_rejected() {
        assert!(Cli::try_parse_from(["tomato-farm-launch", "--farm", "1x1"]).is_err());
    }

    #[cfg(unix)]
    fn shell(name: &str, script: &str) -> ResolvedProcess {
        ResolvedProcess {
            name: name.to_string(),
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl Fn(String) + Clone + Send + 'static) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        (lines, move |line| sink.lock().unwrap().push(line))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn supervise_delivers_all_output_before_returning() {
        let logs = tempfile::tempdir().unwrap();
        let mut launcher = Launcher::with_log_dir(logs.path().to_path_buf());
        let (lines, print) = collector();
        let processes = [
            shell("gz-1", "seq 1 3000; echo final-error >&2; exit 1"),
            shell("bridge-2", "seq 1 500"),
        ];

        tokio::time::timeout(
            Duration::from_secs(30),
            supervise(&mut launcher, &processes, std::future::pending(), print),
        )
        .await
        .unwrap()
        .unwrap();

        let lines = lines.lock().unwrap();
        let gz: Vec<&String> = lines.iter().filter(|l| l.starts_with("[gz-1] ")).collect();
        assert_eq!(gz.len(), 3001);
        assert!(gz.iter().any(|l| l.as_str() == "[gz-1] final-error"));
        assert_eq!(
            lines.iter().filter(|l| l.starts_with("[bridge-2] ")).count(),
            500
        );
        assert_eq!(launcher.running(), 0);

        let logged: usize = std::fs::read_dir(logs.path())
            .unwrap()
            .map(|entry| {
                std::fs::read_to_string(entry.unwrap().path())
                    .unwrap()
                    .lines()
                    .count()
            })
            .sum();
        assert_eq!(logged, 3501);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn supervise_stops_processes_on_shutdown() {
        let logs = tempfile::tempdir().unwrap();
        let mut launcher = Launcher::with_log_dir(logs.path().to_path_buf());
        let (lines, print) = collector();
        let processes = [shell("sleeper-1", "echo ready; exec sleep 30")];

        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
        };
        tokio::time::timeout(
            Duration::from_secs(10),
            supervise(&mut launcher, &processes, shutdown, print),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(*lines.lock().unwrap(), ["[sleeper-1] ready"]);
        assert_eq!(launcher.running(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn supervise_stops_started_processes_when_a_spawn_fails() {
        let logs = tempfile::tempdir().unwrap();
        let mut launcher = Launcher::with_log_dir(logs.path().to_path_buf());
        let (_, print) = collector();
        let processes = [
            shell("sleeper-1", "exec sleep 30"),
            ResolvedProcess {
                name: "gz-2".to_string(),
                program: PathBuf::from("/nonexistent/gz"),
                args: Vec::new(),
            },
        ];

        let err = tokio::time::timeout(
            Duration::from_secs(10),
            supervise(&mut launcher, &processes, std::future::pending(), print),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert!(format!("{err:#}").contains("/nonexistent/gz"));
        assert_eq!(launcher.running(), 0);
    }
}
