#![allow(unexpected_cfgs)]

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process;

use anyhow::anyhow;
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use warren_data::{AuthLimiterStore, CappedStore};
use warren_events::{Event, EventKind};
use warren_logs::{LogStore, LogView};
use warren_settings::{
    Bootstrap, DEVICE_KEY_OVERRIDE_TTL_HOURS, GroupName, SettingsError, SettingsStore,
    parse_address, parse_cli_value, render,
};

const DEFAULT_CONF_PATH: &str = "/etc/warren/warren.json";
const CLUSTER_UPDATE_MESSAGE: &str = "Successfully updated configuration. This change is \
    stored in the database and has been applied to all hosts in the cluster.";
const LOCAL_UPDATE_MESSAGE: &str = "Successfully updated configuration. This change is \
    stored locally and applies only to this host.";

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("error: {}", err.display_message());
        process::exit(err.exit_code());
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> CliResult<()> {
    let conf = cli.conf;
    match cli.command {
        Command::Get(args) => handle_get(&conf, &args).await,
        Command::Set(args) => handle_set(&conf, &args).await,
        Command::Unset(args) => handle_unset(&conf, &args).await,
        Command::OverrideDeviceKey => handle_override_device_key(&conf).await,
        Command::RequireDeviceKey => handle_require_device_key(&conf).await,
        Command::Logs(args) => handle_logs(&conf, &args).await,
        Command::ClearLogs => handle_clear_logs(&conf).await,
        Command::ClearAuthLimit => handle_clear_auth_limit(&conf).await,
        Command::GetDatabaseUri => handle_get_database_uri(&conf).await,
        Command::SetDatabaseUri(args) => handle_set_database_uri(&conf, args).await,
        Command::GetHostId => handle_get_host_id(&conf).await,
        Command::SetHostId(args) => handle_set_host_id(&conf, args).await,
        Command::Reconfigure => handle_reconfigure(&conf).await,
        Command::Version => {
            println!("warren v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[derive(Parser)]
#[command(name = "warren", about = "Administrative CLI for the Warren cluster")]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "WARREN_CONF",
        default_value = DEFAULT_CONF_PATH,
        help = "Path to the node-local bootstrap configuration file"
    )]
    conf: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print configuration values for a group or a single group.field address
    Get(GetArgs),
    /// Set a configuration value at a group.field address
    Set(SetArgs),
    /// Remove a configuration override, restoring the default
    Unset(UnsetArgs),
    /// Temporarily allow device registration without a device key
    OverrideDeviceKey,
    /// End a device key override immediately
    RequireDeviceKey,
    /// View, follow, or archive the cluster log
    Logs(LogsArgs),
    /// Drop all stored log entries and resize the log streams
    ClearLogs,
    /// Clear all failed-authentication limiter records
    ClearAuthLimit,
    /// Print the cluster database URI
    GetDatabaseUri,
    /// Set the cluster database URI in the local bootstrap file
    SetDatabaseUri(SetDatabaseUriArgs),
    /// Print this host's identifier
    GetHostId,
    /// Set this host's identifier in the local bootstrap file
    SetHostId(SetHostIdArgs),
    /// Reset the database connection for first-time setup
    Reconfigure,
    /// Print the version
    Version,
}

#[derive(Args)]
struct GetArgs {
    #[arg(help = "Configuration group or group.field address")]
    target: String,
}

#[derive(Args)]
struct SetArgs {
    #[arg(help = "Configuration group.field address")]
    address: String,
    #[arg(help = "New value, parsed as JSON or taken as a literal string")]
    value: String,
}

#[derive(Args)]
struct UnsetArgs {
    #[arg(help = "Configuration group.field address")]
    address: String,
}

#[derive(Args, Default)]
struct LogsArgs {
    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = "./",
        help = "Write the log to a file or directory instead of the terminal"
    )]
    archive: Option<PathBuf>,
    #[arg(long, help = "Follow the log for new entries")]
    tail: bool,
    #[arg(long, help = "Maximum number of entries to fetch")]
    limit: Option<i64>,
    #[arg(long, help = "Show entries in raw insertion order")]
    natural: bool,
    #[arg(long, help = "Disable colored output")]
    unformatted: bool,
}

#[derive(Args)]
struct SetDatabaseUriArgs {
    #[arg(help = "Postgres connection URI for the cluster database; omit to reset to the default")]
    uri: Option<String>,
}

#[derive(Args)]
struct SetHostIdArgs {
    #[arg(help = "Host identifier")]
    host_id: String,
}

#[derive(Debug)]
enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

type CliResult<T> = Result<T, CliError>;

impl CliError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

/// Operator mistakes exit 2, infrastructure failures exit 3.
fn settings_error(err: SettingsError) -> CliError {
    match err {
        SettingsError::NotFound { group, field } => CliError::validation(match field {
            Some(field) => format!("unknown configuration field '{group}.{field}'"),
            None => format!("unknown configuration group '{group}'"),
        }),
        SettingsError::TypeMismatch {
            group,
            field,
            expected,
            provided,
        } => CliError::validation(format!(
            "cannot set {group}.{field}: value type {provided} conflicts with \
             established type {expected}"
        )),
        SettingsError::InvalidAddress { address } => CliError::validation(format!(
            "invalid address '{address}'; expected group.field"
        )),
        other => CliError::failure(anyhow!(other)),
    }
}

fn log_error(err: warren_logs::LogError) -> CliError {
    CliError::failure(anyhow!(err))
}

async fn load_bootstrap(conf: &PathBuf) -> CliResult<Bootstrap> {
    Bootstrap::load(conf).await.map_err(settings_error)
}

async fn open_store(conf: &PathBuf) -> CliResult<SettingsStore> {
    let bootstrap = load_bootstrap(conf).await?;
    SettingsStore::connect(bootstrap)
        .await
        .map_err(settings_error)
}

fn parse_target(address: &str) -> CliResult<(GroupName, &str)> {
    let (group, field) = parse_address(address).map_err(settings_error)?;
    let group = GroupName::parse(group).map_err(settings_error)?;
    Ok((group, field))
}

fn print_field(group: GroupName, field: &str, value: &Value) {
    println!("{group}.{field} = {}", render(value));
}

async fn handle_get(conf: &PathBuf, args: &GetArgs) -> CliResult<()> {
    if args.target.contains('.') {
        let (group, field) = parse_target(&args.target)?;
        let value = if group == GroupName::Conf {
            let bootstrap = load_bootstrap(conf).await?;
            bootstrap
                .group()
                .get(field)
                .map_err(settings_error)?
                .clone()
        } else {
            let store = open_store(conf).await?;
            store.get(group, field).await.map_err(settings_error)?
        };
        print_field(group, field, &value);
        return Ok(());
    }

    let group = GroupName::parse(&args.target).map_err(settings_error)?;
    if group == GroupName::Conf {
        let bootstrap = load_bootstrap(conf).await?;
        for field in bootstrap.group().fields() {
            let value = bootstrap.group().get(field).map_err(settings_error)?;
            print_field(group, field, value);
        }
    } else {
        let store = open_store(conf).await?;
        for (field, value) in store.get_group(group).await.map_err(settings_error)? {
            print_field(group, &field, &value);
        }
    }
    Ok(())
}

async fn handle_set(conf: &PathBuf, args: &SetArgs) -> CliResult<()> {
    let (group, field) = parse_target(&args.address)?;
    let value = parse_cli_value(&args.value);

    if group == GroupName::Conf {
        let mut bootstrap = load_bootstrap(conf).await?;
        bootstrap
            .group_mut()
            .set(field, value.clone())
            .map_err(settings_error)?;
        bootstrap.commit().await.map_err(settings_error)?;
        print_field(group, field, &value);
        println!("{LOCAL_UPDATE_MESSAGE}");
        return Ok(());
    }

    let store = open_store(conf).await?;
    store
        .set(group, field, value.clone())
        .await
        .map_err(settings_error)?;
    store.commit(group).await.map_err(settings_error)?;
    print_field(group, field, &value);
    println!("{CLUSTER_UPDATE_MESSAGE}");
    Ok(())
}

async fn handle_unset(conf: &PathBuf, args: &UnsetArgs) -> CliResult<()> {
    let (group, field) = parse_target(&args.address)?;

    if group == GroupName::Conf {
        let mut bootstrap = load_bootstrap(conf).await?;
        bootstrap.group_mut().unset(field).map_err(settings_error)?;
        bootstrap.commit().await.map_err(settings_error)?;
        let value = bootstrap.group().get(field).map_err(settings_error)?;
        print_field(group, field, value);
        println!("{LOCAL_UPDATE_MESSAGE}");
        return Ok(());
    }

    let store = open_store(conf).await?;
    store.unset(group, field).await.map_err(settings_error)?;
    store.commit(group).await.map_err(settings_error)?;
    let value = store.get(group, field).await.map_err(settings_error)?;
    print_field(group, field, &value);
    println!("{CLUSTER_UPDATE_MESSAGE}");
    Ok(())
}

async fn handle_override_device_key(conf: &PathBuf) -> CliResult<()> {
    let store = open_store(conf).await?;
    let expires_at = Utc::now() + ChronoDuration::hours(DEVICE_KEY_OVERRIDE_TTL_HOURS);
    store
        .set(GroupName::User, "device_key_override", json!(expires_at.timestamp()))
        .await
        .map_err(settings_error)?;
    store.commit(GroupName::User).await.map_err(settings_error)?;
    println!(
        "Device registration key override active for {DEVICE_KEY_OVERRIDE_TTL_HOURS} hours. \
         Use command require-device-key to reactivate."
    );
    Ok(())
}

async fn handle_require_device_key(conf: &PathBuf) -> CliResult<()> {
    let store = open_store(conf).await?;
    store
        .unset(GroupName::User, "device_key_override")
        .await
        .map_err(settings_error)?;
    store.commit(GroupName::User).await.map_err(settings_error)?;
    println!("Device registration key override deactivated.");
    Ok(())
}

async fn handle_logs(conf: &PathBuf, args: &LogsArgs) -> CliResult<()> {
    let bootstrap = load_bootstrap(conf).await?;
    let database_uri = bootstrap.database_uri().map_err(settings_error)?;
    let store = SettingsStore::connect(bootstrap)
        .await
        .map_err(settings_error)?;
    let capped = CappedStore::new(store.pool().clone(), store.collections().clone());
    let view = LogView::new(capped, database_uri);
    let formatted = !args.unformatted && io::stdout().is_terminal();

    if let Some(destination) = &args.archive {
        let path = view
            .archive_log(destination, args.natural, args.limit)
            .await
            .map_err(log_error)?;
        println!("Log archived to {}", path.display());
        return Ok(());
    }

    let mut lines = view
        .get_log_lines(args.natural, args.limit, formatted)
        .await
        .map_err(log_error)?;
    // The default view is newest first; the terminal listing puts the
    // newest line at the bottom.
    if !args.natural {
        lines.reverse();
    }
    for line in lines {
        println!("{line}");
    }

    if args.tail {
        let mut tail = view.tail_log_lines().await.map_err(log_error)?;
        loop {
            let entry = tail.next().await.map_err(log_error)?;
            println!("{}", entry.format_line(formatted));
        }
    }
    Ok(())
}

async fn handle_clear_logs(conf: &PathBuf) -> CliResult<()> {
    let store = open_store(conf).await?;
    let log_limit = store
        .get(GroupName::App, "log_limit")
        .await
        .map_err(settings_error)?
        .as_i64()
        .unwrap_or(warren_data::DEFAULT_LOG_LIMIT);
    let log_entry_limit = store
        .get(GroupName::App, "log_entry_limit")
        .await
        .map_err(settings_error)?
        .as_i64()
        .unwrap_or(warren_data::DEFAULT_LOG_ENTRY_LIMIT);

    let capped = CappedStore::new(store.pool().clone(), store.collections().clone());
    LogStore::new(capped)
        .recreate_streams(log_limit, log_entry_limit)
        .await
        .map_err(log_error)?;
    store
        .events()
        .publish(&Event::new(EventKind::LogsCleared))
        .await
        .map_err(|err| CliError::failure(anyhow!(err)))?;
    println!("Log entries cleared");
    Ok(())
}

async fn handle_clear_auth_limit(conf: &PathBuf) -> CliResult<()> {
    let store = open_store(conf).await?;
    let limiter = AuthLimiterStore::new(store.pool().clone(), store.collections().clone());
    limiter
        .clear_all()
        .await
        .map_err(|err| CliError::failure(anyhow!(err)))?;
    println!("Auth limiter cleared");
    Ok(())
}

async fn handle_get_database_uri(conf: &PathBuf) -> CliResult<()> {
    let bootstrap = load_bootstrap(conf).await?;
    println!("{}", bootstrap.database_uri().map_err(settings_error)?);
    Ok(())
}

async fn handle_set_database_uri(conf: &PathBuf, args: SetDatabaseUriArgs) -> CliResult<()> {
    let mut bootstrap = load_bootstrap(conf).await?;
    match args.uri.as_deref().map(str::trim) {
        Some("") => return Err(CliError::validation("database uri cannot be empty")),
        Some(uri) => {
            bootstrap
                .group_mut()
                .set("database_uri", json!(uri))
                .map_err(settings_error)?;
            bootstrap.commit().await.map_err(settings_error)?;
            println!("Successfully set database uri");
        }
        None => {
            bootstrap
                .group_mut()
                .unset("database_uri")
                .map_err(settings_error)?;
            bootstrap.commit().await.map_err(settings_error)?;
            println!("Successfully reset database uri");
        }
    }
    Ok(())
}

async fn handle_get_host_id(conf: &PathBuf) -> CliResult<()> {
    let bootstrap = load_bootstrap(conf).await?;
    println!("{}", bootstrap.host_id().map_err(settings_error)?);
    Ok(())
}

async fn handle_set_host_id(conf: &PathBuf, args: SetHostIdArgs) -> CliResult<()> {
    let host_id = args.host_id.trim();
    if host_id.is_empty() {
        return Err(CliError::validation("host id cannot be empty"));
    }
    let mut bootstrap = load_bootstrap(conf).await?;
    bootstrap
        .group_mut()
        .set("host_id", json!(host_id))
        .map_err(settings_error)?;
    bootstrap.commit().await.map_err(settings_error)?;
    println!("Successfully set host id");
    Ok(())
}

/// Reset the database connection so the node runs first-time setup again.
async fn handle_reconfigure(conf: &PathBuf) -> CliResult<()> {
    let mut bootstrap = load_bootstrap(conf).await?;
    bootstrap
        .group_mut()
        .unset("database_uri")
        .map_err(settings_error)?;
    bootstrap.commit().await.map_err(settings_error)?;
    println!("Successfully reconfigured host");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn conf_flag_defaults_to_system_path() {
        let cli = Cli::try_parse_from(["warren", "version"]).expect("parse");
        assert_eq!(cli.conf, PathBuf::from(DEFAULT_CONF_PATH));
    }

    #[test]
    fn conf_flag_is_global() {
        let cli = Cli::try_parse_from(["warren", "get", "app", "--conf", "/tmp/w.json"])
            .expect("parse");
        assert_eq!(cli.conf, PathBuf::from("/tmp/w.json"));
    }

    #[test]
    fn logs_archive_takes_optional_path() {
        let cli = Cli::try_parse_from(["warren", "logs", "--archive"]).expect("parse");
        let Command::Logs(args) = cli.command else {
            panic!("expected logs command");
        };
        assert_eq!(args.archive, Some(PathBuf::from("./")));

        let cli = Cli::try_parse_from(["warren", "logs", "--archive", "/tmp/out.log"])
            .expect("parse");
        let Command::Logs(args) = cli.command else {
            panic!("expected logs command");
        };
        assert_eq!(args.archive, Some(PathBuf::from("/tmp/out.log")));
    }

    #[test]
    fn logs_flags_combine() {
        let cli = Cli::try_parse_from([
            "warren",
            "logs",
            "--tail",
            "--limit",
            "50",
            "--natural",
            "--unformatted",
        ])
        .expect("parse");
        let Command::Logs(args) = cli.command else {
            panic!("expected logs command");
        };
        assert!(args.tail);
        assert_eq!(args.limit, Some(50));
        assert!(args.natural);
        assert!(args.unformatted);
    }

    #[test]
    fn set_requires_address_and_value() {
        assert!(Cli::try_parse_from(["warren", "set", "app.server_name"]).is_err());
        let cli = Cli::try_parse_from(["warren", "set", "app.server_name", "edge-1"])
            .expect("parse");
        let Command::Set(args) = cli.command else {
            panic!("expected set command");
        };
        assert_eq!(args.address, "app.server_name");
        assert_eq!(args.value, "edge-1");
    }

    #[test]
    fn validation_and_failure_exit_codes_differ() {
        assert_eq!(CliError::validation("bad input").exit_code(), 2);
        assert_eq!(CliError::failure(anyhow!("broken")).exit_code(), 3);
    }

    #[test]
    fn address_errors_map_to_validation() {
        let err = settings_error(SettingsError::InvalidAddress {
            address: "app".to_string(),
        });
        assert!(matches!(err, CliError::Validation(message) if message.contains("app")));
    }

    #[test]
    fn parse_target_rejects_unknown_groups() {
        let err = parse_target("nope.field").expect_err("unknown group");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn set_database_uri_accepts_an_omitted_value() {
        let cli = Cli::try_parse_from(["warren", "set-database-uri"]).expect("parse");
        let Command::SetDatabaseUri(args) = cli.command else {
            panic!("expected set-database-uri command");
        };
        assert_eq!(args.uri, None);

        let cli = Cli::try_parse_from(["warren", "set-database-uri", "postgres://db0/warren"])
            .expect("parse");
        let Command::SetDatabaseUri(args) = cli.command else {
            panic!("expected set-database-uri command");
        };
        assert_eq!(args.uri.as_deref(), Some("postgres://db0/warren"));
    }
}
