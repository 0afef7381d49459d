//! `denormalise-nvp` -- build a project file from a normalised snapshot.
//!
//! Attaches an empty template project to a SQL Server instance under a
//! throwaway database name, runs the transform program against it, saves
//! the result next to the input and drops the working database. With
//! `--server` the template is copied to that host and the saved project is
//! copied back.
//!
//! # Environment variables
//!
//! Every connection flag can also be set from the environment (or a `.env`
//! file):
//!
//! | Variable                | Flag                  | Default                |
//! |-------------------------|-----------------------|------------------------|
//! | `NVT_NVIVO_VERSION`     | `--nvivoversion`      | `10`                   |
//! | `NVT_SERVER`            | `--server`            | this machine           |
//! | `NVT_PORT`              | `--port`              | discovered             |
//! | `NVT_INSTANCE`          | `--instance`          | discovered             |
//! | `NVT_LOCAL_SERVER`      | `--local-server`      | `true` on Windows      |
//! | `NVT_TEMPLATE_DIR`      | `--template-dir`      | executable's directory |
//! | `NVT_TRANSFORM_PROGRAM` | `--transform-program` | `nvivo-denormalise`    |
//! | `NVT_REMOTE_SHELL`      | `--remote-shell`      | `ssh`                  |
//! | `NVT_REMOTE_COPY`       | `--remote-copy`       | `scp`                  |
//! | `NVT_SERVER_WORK_DIR`   | `--server-work-dir`   | `C:\Windows\Temp`      |
//! | `NVT_DB_USER`           | `--db-user`           | `nvivotools`           |
//! | `NVT_DB_PASSWORD`       | `--db-password`       | `nvivotools`           |

mod args;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nvptools_core::command::ProcessRunner;
use nvptools_core::sqlcmd::SqlcmdAdmin;
use nvptools_core::transform::ProgramTransformer;
use nvptools_core::Orchestrator;

use args::Args;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.default_log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = args.run_config()?;

    let runner = ProcessRunner::for_host(args.server.as_deref())
        .with_remote_shell(&args.remote_shell)
        .with_remote_copy(&args.remote_copy);
    let admin = SqlcmdAdmin::new(&runner).with_work_dir(&args.server_work_dir);
    let transformer = ProgramTransformer::new(&args.transform_program)
        .with_args(args.transform_args.iter().cloned());

    tracing::debug!(?config, "Starting denormalisation");

    let summary = Orchestrator::new(&runner, &admin, &transformer).run(&config)?;

    tracing::info!(
        output = %summary.output.display(),
        instance = %summary.target.instance,
        port = summary.target.port,
        "Wrote project file",
    );
    Ok(())
}
