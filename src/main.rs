use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use svcm::app::App;
use svcm::config::{self, Config};
use svcm::manager::{Scope, ServiceAction, ServiceManager};
use svcm::rpc::RpcServer;
use svcm::{cli, logging};

#[derive(Parser, Debug)]
#[command(name = "svcm", version, about = "Manage system services")]
struct Args {
    /// Talk to the system-wide service manager instead of the user one
    #[arg(short = 'P', long, global = true)]
    privileged: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List services
    List,
    /// Start a service
    Start { name: String },
    /// Stop a service
    Stop { name: String },
    /// Restart a service
    Restart { name: String },
    /// Show the status of a service
    Status { name: String },
    /// Show recent log lines of a service
    Logs {
        name: String,
        /// Number of lines to show
        #[arg(short = 'n', long)]
        lines: Option<usize>,
    },
    /// Interactive dashboard
    Tui,
    /// JSON-RPC tool server on stdin/stdout
    Mcp,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if matches!(args.command, Command::Tui) {
        logging::init_file();
    } else {
        logging::init_stderr();
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = config::load_config(args.config.as_deref())?;
    let scope = Scope::from_privileged(args.privileged);
    let manager = ServiceManager::with_options(config.manager_options(scope))
        .with_context(|| format!("failed to connect to the {} service manager", scope))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.command {
        Command::List => cli::list(&manager, &mut out),
        Command::Start { name } => cli::control(&manager, ServiceAction::Start, &name, &mut out),
        Command::Stop { name } => cli::control(&manager, ServiceAction::Stop, &name, &mut out),
        Command::Restart { name } => {
            cli::control(&manager, ServiceAction::Restart, &name, &mut out)
        }
        Command::Status { name } => cli::status(&manager, &name, &mut out),
        Command::Logs { name, lines } => {
            let lines = lines.unwrap_or(config.cli.log_lines);
            cli::logs(&manager, &name, lines, &mut out)
        }
        Command::Tui => {
            drop(out);
            run_dashboard(manager, &config)
        }
        Command::Mcp => {
            log::info!("serving JSON-RPC on stdio ({} scope)", scope);
            RpcServer::new(&manager).serve(io::stdin().lock(), out)
        }
    }
}

fn run_dashboard(manager: ServiceManager, config: &Config) -> Result<()> {
    let mut app = App::new(Arc::new(manager), config.dashboard_options());

    let mut terminal = ratatui::init();
    let result = app.run(&mut terminal);
    ratatui::restore();

    result
}
