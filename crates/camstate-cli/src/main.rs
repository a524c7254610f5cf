// crates/camstate-cli/src/main.rs
// ============================================================================
// Module: camstate CLI Entry Point
// Description: Command dispatcher for local state core inspection and control.
// Purpose: Start the state core against configured stores and run one command.
// Dependencies: camstate-config, camstate-core, camstate-daemon, clap, serde_json
// ============================================================================

//! ## Overview
//! Every state command starts the state core with the configured stores,
//! runs, and shuts it down again, so the stores see the same startup checks,
//! migrations, and persistence rules as the daemon. `serve` keeps the core
//! running and applies one JSON mutation request per stdin line.
//!
//! Results go to stdout as JSON; diagnostics go to stderr.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::io::BufRead;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use camstate_config::CONFIG_ENV_VAR;
use camstate_config::CamstateConfig;
use camstate_config::DEFAULT_CONFIG_NAME;
use camstate_core::Caller;
use camstate_core::Capability;
use camstate_core::CapabilitySet;
use camstate_core::CategoryId;
use camstate_core::NewCategory;
use camstate_core::NewTag;
use camstate_core::TagId;
use camstate_core::Timestamp;
use camstate_daemon::LifecycleController;
use camstate_daemon::MutationRequest;
use camstate_daemon::StateCore;
use camstate_daemon::init_logging;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use serde_json::json;
use thiserror::Error;
use tracing::info;
use tracing::warn;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "camstate", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file (defaults to `CAMSTATE_CONFIG`, then `camstate.toml`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the state core, print the startup report, and stop.
    Check,
    /// Print readable entries, or one entry.
    Get(GetCommand),
    /// Set one entry.
    Set(SetCommand),
    /// Apply a JSON mutation request.
    Apply(ApplyCommand),
    /// Apply one JSON mutation request per stdin line until EOF.
    Serve(ServeCommand),
    /// Tag category management.
    Categories {
        /// Caller role.
        #[command(flatten)]
        caller: CallerArgs,
        /// Selected category subcommand.
        #[command(subcommand)]
        command: CategoryCommand,
    },
    /// Timeline tag management.
    Tags {
        /// Selected tag subcommand.
        #[command(subcommand)]
        command: TagCommand,
    },
    /// Recording metadata.
    Records {
        /// Selected record subcommand.
        #[command(subcommand)]
        command: RecordCommand,
    },
    /// Return entries to defaults, keeping the configured allowlist.
    FactoryReset(FactoryResetCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Caller role used for permission checks.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum RoleArg {
    /// Read-only client.
    Viewer,
    /// Camera operator.
    Operator,
    /// Device administrator.
    Admin,
    /// Internal system caller.
    System,
}

/// Arguments shared by commands acting on behalf of a caller.
#[derive(Args, Debug, Clone)]
struct CallerArgs {
    /// Role to act as.
    #[arg(long = "as", value_enum, default_value = "admin", global = true)]
    role: RoleArg,
}

/// Arguments for `get`.
#[derive(Args, Debug)]
struct GetCommand {
    /// Entry name; all readable entries when omitted.
    key: Option<String>,
    /// Caller role.
    #[command(flatten)]
    caller: CallerArgs,
}

/// Arguments for `set`.
#[derive(Args, Debug)]
struct SetCommand {
    /// Entry name.
    key: String,
    /// JSON value; bare words are taken as strings.
    value: String,
    /// Caller role.
    #[command(flatten)]
    caller: CallerArgs,
}

/// Arguments for `apply`.
#[derive(Args, Debug)]
struct ApplyCommand {
    /// Request body, a flat JSON object.
    request: String,
    /// Caller role.
    #[command(flatten)]
    caller: CallerArgs,
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Caller role.
    #[command(flatten)]
    caller: CallerArgs,
}

/// Category subcommands.
#[derive(Subcommand, Debug)]
enum CategoryCommand {
    /// List categories.
    List,
    /// Create a category.
    Add {
        /// Category id; the next free id when omitted.
        #[arg(long)]
        id: Option<i64>,
        /// Display name.
        name: String,
        /// Display color.
        color: String,
    },
    /// Rename or recolor a category.
    Update {
        /// Category id.
        id: i64,
        /// New display name.
        name: String,
        /// New display color.
        color: String,
    },
    /// Delete a category without active tags.
    Remove {
        /// Category id.
        id: i64,
    },
}

/// Tag subcommands.
#[derive(Subcommand, Debug)]
enum TagCommand {
    /// List active tags.
    List {
        /// Include soft-deleted tags.
        #[arg(long)]
        all: bool,
    },
    /// Create a tag.
    Add {
        /// Category id.
        category: i64,
        /// Tag time in Unix milliseconds; now when omitted.
        #[arg(long)]
        at: Option<i64>,
        /// Short title.
        #[arg(long, default_value = "")]
        title: String,
        /// Free-form note.
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Soft-delete a tag.
    Delete {
        /// Tag id.
        id: i64,
    },
}

/// Record subcommands.
#[derive(Subcommand, Debug)]
enum RecordCommand {
    /// List recordings.
    List,
}

/// Arguments for `factory-reset`.
#[derive(Args, Debug)]
struct FactoryResetCommand {
    /// Keys to keep instead of the configured allowlist.
    #[arg(long = "keep", value_name = "KEY")]
    keep: Vec<String>,
    /// Confirm the reset.
    #[arg(long)]
    yes: bool,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the config file.
    Validate,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging).map_err(|err| CliError::new(format!("logging setup failed: {err}")))?;
    let mut stdout = std::io::stdout().lock();
    execute(cli.command, config, &mut stdout)
}

/// Runs one command against `config`, writing results to `out`.
fn execute(command: Commands, config: CamstateConfig, out: &mut dyn Write) -> CliResult<ExitCode> {
    match command {
        Commands::Check => with_core(config, |core| command_check(core, out)),
        Commands::Get(command) => with_core(config, |core| command_get(core, &command, out)),
        Commands::Set(command) => with_core(config, |core| {
            let request = MutationRequest::new().with(command.key.clone(), parse_value_arg(&command.value));
            command_apply(core, &command.caller, &request, out)
        }),
        Commands::Apply(command) => with_core(config, |core| {
            let request = MutationRequest::from_json_str(&command.request).map_err(|err| CliError::new(err.to_string()))?;
            command_apply(core, &command.caller, &request, out)
        }),
        Commands::Serve(command) => with_core(config, |core| {
            let stdin = std::io::stdin().lock();
            command_serve(core, &command.caller, stdin, out)
        }),
        Commands::Categories {
            caller,
            command,
        } => with_core(config, |core| command_categories(core, &caller, command, out)),
        Commands::Tags {
            command,
        } => with_core(config, |core| command_tags(core, command, out)),
        Commands::Records {
            command: RecordCommand::List,
        } => with_core(config, |core| {
            let records = core.metadata().read_all_records().map_err(store_error)?;
            write_json(out, &records)?;
            Ok(ExitCode::SUCCESS)
        }),
        Commands::FactoryReset(command) => command_factory_reset(config, &command, out),
        Commands::Config {
            command: ConfigCommand::Validate,
        } => {
            write_line(out, "config ok")?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Loads configuration. Without an explicit path, an absent default file
/// means built-in defaults.
fn load_config(path: Option<&Path>) -> CliResult<CamstateConfig> {
    let implicit = path.is_none() && std::env::var_os(CONFIG_ENV_VAR).is_none();
    if implicit && !Path::new(DEFAULT_CONFIG_NAME).exists() {
        return Ok(CamstateConfig::default());
    }
    CamstateConfig::load(path).map_err(|err| CliError::new(format!("config load failed: {err}")))
}

// ============================================================================
// SECTION: State Core
// ============================================================================

/// Starts the state core, runs `action`, and always shuts down.
fn with_core<T>(config: CamstateConfig, action: impl FnOnce(&StateCore) -> CliResult<T>) -> CliResult<T> {
    let core = LifecycleController::new(config)
        .startup()
        .map_err(|err| CliError::new(format!("startup failed: {err}")))?;
    let result = action(&core);
    let stopped = core.shutdown();
    let value = result?;
    stopped.map_err(|err| CliError::new(format!("shutdown failed: {err}")))?;
    Ok(value)
}

/// Builds the caller for a role.
fn caller_for(role: RoleArg) -> Caller {
    match role {
        RoleArg::Viewer => Caller::new("cli-viewer", CapabilitySet::of(&[Capability::Viewer])),
        RoleArg::Operator => Caller::new("cli-operator", CapabilitySet::of(&[Capability::Operator])),
        RoleArg::Admin => Caller::new("cli-admin", CapabilitySet::of(&[Capability::Admin])),
        RoleArg::System => Caller::system(),
    }
}

/// Parses a value argument as JSON, falling back to a string.
fn parse_value_arg(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `check`.
fn command_check(core: &StateCore, out: &mut dyn Write) -> CliResult<ExitCode> {
    let report = core.report();
    let skipped: Vec<_> =
        report.skipped.iter().map(|(key, reason)| json!({ "key": key, "reason": reason })).collect();
    let bootstrap_skipped: Vec<_> = report
        .bootstrap
        .skipped
        .iter()
        .map(|skip| json!({ "key": skip.key, "reason": skip.reason }))
        .collect();
    let summary = json!({
        "entries": core.registry().len(),
        "appliedMigrations": report.applied_migrations,
        "bootstrap": {
            "seeded": report.bootstrap.seeded,
            "inserted": report.bootstrap.inserted,
            "skipped": bootstrap_skipped,
        },
        "categoriesLoaded": report.categories_loaded,
        "restored": report.restored,
        "skipped": skipped,
        "capabilities": report.capabilities,
        "probeFallback": report.probe_fallback,
    });
    write_json(out, &summary)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `get`.
fn command_get(core: &StateCore, command: &GetCommand, out: &mut dyn Write) -> CliResult<ExitCode> {
    let caller = caller_for(command.caller.role);
    let values = match &command.key {
        Some(key) => {
            let value = core.pipeline().read(&caller, key).map_err(|err| CliError::new(err.to_string()))?;
            vec![(key.clone(), value)]
        }
        None => core.snapshot(&caller).map_err(|err| CliError::new(err.to_string()))?.into_iter().collect(),
    };
    let mut object = serde_json::Map::new();
    for (key, value) in values {
        let json = value.to_json().map_err(|err| CliError::new(format!("{key}: {err}")))?;
        object.insert(key, json);
    }
    write_json(out, &serde_json::Value::Object(object))?;
    Ok(ExitCode::SUCCESS)
}

/// Applies one request and prints the acknowledgement or rejection.
fn command_apply(
    core: &StateCore,
    caller: &CallerArgs,
    request: &MutationRequest,
    out: &mut dyn Write,
) -> CliResult<ExitCode> {
    match core.apply_request(&caller_for(caller.role), request) {
        Ok(ack) => {
            write_json(out, &ack)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(rejection) => {
            write_json(out, &rejection)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Executes `serve`: one request per input line, one result line each.
fn command_serve(
    core: &StateCore,
    caller: &CallerArgs,
    input: impl BufRead,
    out: &mut dyn Write,
) -> CliResult<ExitCode> {
    let caller = caller_for(caller.role);
    info!(caller = caller.id(), "serving mutation requests from stdin");
    let mut handled = 0_u64;
    for line in input.lines() {
        let line = line.map_err(|err| CliError::new(format!("stdin read failed: {err}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let result = MutationRequest::from_json_str(&line).and_then(|request| core.apply_request(&caller, &request));
        let response = match result {
            Ok(ack) => json!({ "result": "applied", "ack": ack }),
            Err(rejection) => json!({ "result": "rejected", "rejection": rejection }),
        };
        let text = serde_json::to_string(&response).map_err(|err| CliError::new(err.to_string()))?;
        write_line(out, &text)?;
        let pending = !core.pipeline().pending_persistence().is_empty();
        if (pending || core.bridge().is_divergent())
            && let Err(err) = core.retry_pending()
        {
            warn!(error = %err, "persistence retry failed");
        }
        handled += 1;
    }
    info!(handled, "stdin closed");
    Ok(ExitCode::SUCCESS)
}

/// Executes `categories`.
fn command_categories(
    core: &StateCore,
    caller: &CallerArgs,
    command: CategoryCommand,
    out: &mut dyn Write,
) -> CliResult<ExitCode> {
    let caller = caller_for(caller.role);
    let bridge = core.bridge();
    match command {
        CategoryCommand::List => {
            let categories: Vec<_> = bridge.categories(&caller).map_err(sync_error)?.into_values().collect();
            write_json(out, &categories)?;
        }
        CategoryCommand::Add {
            id,
            name,
            color,
        } => {
            let request = NewCategory::new(name, color);
            let request = match id {
                Some(id) => request.with_id(CategoryId::new(id)),
                None => request,
            };
            let category = bridge.insert_category(&caller, request).map_err(sync_error)?;
            write_json(out, &category)?;
        }
        CategoryCommand::Update {
            id,
            name,
            color,
        } => {
            let category =
                bridge.update_category(&caller, CategoryId::new(id), &name, &color).map_err(sync_error)?;
            write_json(out, &category)?;
        }
        CategoryCommand::Remove {
            id,
        } => {
            bridge.delete_category(&caller, CategoryId::new(id)).map_err(sync_error)?;
            write_line(out, &format!("category {id} removed"))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `tags`.
fn command_tags(core: &StateCore, command: TagCommand, out: &mut dyn Write) -> CliResult<ExitCode> {
    let store = core.metadata();
    match command {
        TagCommand::List {
            all,
        } => {
            let tags = if all { store.read_all_tags() } else { store.read_active_tags() }.map_err(store_error)?;
            write_json(out, &tags)?;
        }
        TagCommand::Add {
            category,
            at,
            title,
            note,
        } => {
            let timestamp = at.map_or_else(Timestamp::now, Timestamp::from_millis);
            let tag = NewTag::new(CategoryId::new(category), timestamp, title, note, "cli");
            let id = store.insert_tag(&tag).map_err(store_error)?;
            write_json(out, &json!({ "id": id }))?;
        }
        TagCommand::Delete {
            id,
        } => {
            store.soft_delete_tag(TagId::new(id)).map_err(store_error)?;
            write_line(out, &format!("tag {id} deleted"))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `factory-reset`.
fn command_factory_reset(
    config: CamstateConfig,
    command: &FactoryResetCommand,
    out: &mut dyn Write,
) -> CliResult<ExitCode> {
    if !command.yes {
        return Err(CliError::new("factory reset requires --yes".to_string()));
    }
    with_core(config, |core| {
        let report = if command.keep.is_empty() {
            core.factory_reset()
        } else {
            let keep: BTreeSet<String> = command.keep.iter().cloned().collect();
            core.factory_reset_preserving(&keep)
        }
        .map_err(|err| CliError::new(format!("factory reset failed: {err}")))?;
        write_json(out, &json!({ "preserved": report.preserved, "reset": report.reset }))?;
        Ok(ExitCode::SUCCESS)
    })
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Maps a sync bridge error.
fn sync_error(error: camstate_core::SyncError) -> CliError {
    CliError::new(error.to_string())
}

/// Maps a metadata store error.
fn store_error(error: camstate_core::MetadataStoreError) -> CliError {
    CliError::new(error.to_string())
}

/// Writes a pretty-printed JSON document.
fn write_json<T: serde::Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|err| CliError::new(format!("encode failed: {err}")))?;
    write_line(out, &text)
}

/// Writes one line.
fn write_line(out: &mut dyn Write, message: &str) -> CliResult<()> {
    writeln!(out, "{message}").map_err(|err| CliError::new(format!("write to stdout failed: {err}")))
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let mut stderr = std::io::stderr();
    let _ = writeln!(&mut stderr, "{message}");
    ExitCode::FAILURE
}
