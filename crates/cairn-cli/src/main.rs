mod commands;

use cairn_api::ConvexRemote;
use cairn_core::{CairnError, CairnResult, ExitCode};
use cairn_fs::{
    META_DIR_NAME, ResolvedRemote, WorkspaceConfig, WorkspacePaths, init_workspace, load_config,
    resolve_remote, resolve_workspace,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "cairn",
    version,
    about = "Keeps a Johnny.Decimal notes folder in sync with its remote store",
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,

    #[arg(long, global = true, value_name = "URL")]
    remote: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_color: bool,

    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the workspace folders and config.
    Init,
    /// Check workspace health and remote configuration.
    Doctor,
    Sync {
        #[command(subcommand)]
        command: SyncCommand,
    },
    /// Turn unsynced remote captures into inbox stubs.
    Ingest,
}

#[derive(Debug, Subcommand)]
enum SyncCommand {
    /// Pull remote notes into the workspace.
    Down {
        /// Rewrite every note regardless of recorded versions.
        #[arg(long)]
        force: bool,
    },
    /// Push local notes to the remote.
    Up {
        /// Skip the version guard; local content wins.
        #[arg(long)]
        force: bool,

        /// Only push these files.
        #[arg(value_name = "FILE")]
        files: Vec<PathBuf>,
    },
    Status,
    Conflicts,
}

#[derive(Debug, Clone)]
struct GlobalOptions {
    workspace: Option<PathBuf>,
    remote: Option<String>,
    json: bool,
}

struct RemoteContext {
    paths: WorkspacePaths,
    config: WorkspaceConfig,
    endpoint: ResolvedRemote,
    remote: ConvexRemote,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    workspace: String,
    created: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    configure_logging(cli.debug, cli.json, cli.no_color);

    let globals = GlobalOptions {
        workspace: cli.workspace,
        remote: cli.remote,
        json: cli.json,
    };

    let result = run_command(cli.command, &globals);

    let exit = match result {
        Ok(code) => code,
        Err(error) => {
            render_error(&error, globals.json);
            error.exit_code()
        }
    };

    std::process::exit(exit.as_i32());
}

fn configure_logging(debug: bool, json: bool, no_color: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(false)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(!no_color)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run_command(command: Command, globals: &GlobalOptions) -> CairnResult<ExitCode> {
    match command {
        Command::Init => commands::workspace::cmd_init(globals),
        Command::Doctor => commands::workspace::cmd_doctor(globals),
        Command::Sync { command } => commands::sync::cmd_sync(command, globals),
        Command::Ingest => commands::capture::cmd_ingest(globals),
    }
}

/// Initialises the workspace if needed and resolves the remote before any work starts.
fn with_remote_context<F>(globals: &GlobalOptions, run: F) -> CairnResult<ExitCode>
where
    F: FnOnce(RemoteContext) -> CairnResult<ExitCode>,
{
    let target = workspace_target(globals)?;
    if !target.join(META_DIR_NAME).is_dir() {
        init_workspace(Some(&target), globals.remote.as_deref())?;
    }

    let paths = resolve_workspace(Some(&target))?;
    let config = load_config(&paths)?;
    let endpoint = resolve_remote(&config, globals.remote.as_deref(), &paths.root)?;
    debug!(url = %endpoint.url, source = ?endpoint.source, "resolved remote");
    let remote = ConvexRemote::new(&endpoint.url, endpoint.timeout)?;

    run(RemoteContext {
        paths,
        config,
        endpoint,
        remote,
    })
}

fn workspace_target(globals: &GlobalOptions) -> CairnResult<PathBuf> {
    if let Some(path) = &globals.workspace {
        return absolutize(path);
    }

    default_workspace_path()
}

fn default_workspace_path() -> CairnResult<PathBuf> {
    let cwd = std::env::current_dir().map_err(|err| {
        CairnError::io(format!(
            "failed to resolve current directory for default workspace: {err}"
        ))
    })?;

    Ok(cwd.join("second-brain"))
}

fn absolutize(path: &Path) -> CairnResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    let cwd = std::env::current_dir().map_err(|err| {
        CairnError::io(format!(
            "failed to resolve current directory for path: {err}"
        ))
    })?;

    Ok(cwd.join(path))
}

fn resolve_user_path(path: PathBuf, workspace_root: &Path) -> CairnResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }

    let cwd = std::env::current_dir().map_err(|err| {
        CairnError::io(format!(
            "failed to resolve current directory for path resolution: {err}"
        ))
    })?;
    let from_cwd = cwd.join(&path);
    if from_cwd.exists() {
        return Ok(from_cwd);
    }

    Ok(workspace_root.join(path))
}

fn render_error(error: &CairnError, json_output: bool) {
    if json_output {
        let payload = json!({
            "ok": false,
            "error": {
                "kind": error.kind,
                "message": &error.message,
            }
        });
        let serialized = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| {
            "{\"ok\":false,\"error\":{\"kind\":\"io\",\"message\":\"failed to serialize error\"}}".to_string()
        });
        eprintln!("{serialized}");
    } else {
        eprintln!("error: {}", error.message);
    }
}

fn print_json<T: Serialize>(value: &T) -> CairnResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CairnError::io(format!("failed to render JSON output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
