//! Disposable Postgres instances for integration tests, without Docker.

use std::fs;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use postgres::NoTls;
use url::Url;

/// Environment variable naming an already-running Postgres to test against.
const EXTERNAL_URL_VAR: &str = "WARREN_TEST_DATABASE_URL";

/// Handle to a disposable Postgres database used in tests.
///
/// Dropping the handle drops the database and, when this helper spawned the
/// server itself, kills the server and removes its data directory.
pub struct TestDatabase {
    connection_string: String,
    server: Option<Child>,
    data_dir: Option<PathBuf>,
    cleanup: Option<DbCleanup>,
}

impl TestDatabase {
    /// Connection string usable with `sqlx` or any Postgres client.
    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        if let Some(cleanup) = &self.cleanup {
            let _ = drop_database(cleanup);
        }
        if let Some(server) = &mut self.server {
            let _ = server.kill();
            let _ = server.wait();
        }
        if let Some(dir) = &self.data_dir {
            let _ = fs::remove_dir_all(dir);
        }
    }
}

struct DbCleanup {
    admin_url: String,
    database: String,
}

/// Provision a fresh database for one test.
///
/// Prefers an externally supplied server via `WARREN_TEST_DATABASE_URL`.
/// When unset, local Postgres binaries (`initdb`, `postgres`, `pg_isready`)
/// are used to spawn a temporary instance. Tests decide whether to skip when
/// this returns an error.
///
/// # Errors
///
/// Returns an error if no external URL is set and Postgres binaries are
/// unavailable or fail to start.
pub fn start_postgres() -> Result<TestDatabase> {
    if let Ok(url) = std::env::var(EXTERNAL_URL_VAR) {
        let created = create_unique_database(&url)?;
        return Ok(TestDatabase {
            connection_string: created.connection_string,
            server: None,
            data_dir: None,
            cleanup: Some(DbCleanup {
                admin_url: created.admin_url,
                database: created.database,
            }),
        });
    }
    spawn_local_server()
}

fn spawn_local_server() -> Result<TestDatabase> {
    let initdb = resolve_binary("initdb")?;
    let postgres_bin = resolve_binary("postgres")?;
    let pg_isready = resolve_binary("pg_isready")?;

    let port = reserve_port()?;
    let data_dir = create_data_dir()?;
    let data_dir_str = data_dir
        .to_str()
        .context("data dir contains non-utf8 characters")?;

    let initdb_status = Command::new(initdb)
        .args(["-D", data_dir_str, "--username=postgres", "--auth=trust"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("failed to run initdb")?;
    if !initdb_status.success() {
        bail!("initdb exited with failure status");
    }

    let server = Command::new(postgres_bin)
        .args(["-D", data_dir_str, "-p", &port.to_string(), "-h", "127.0.0.1"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to start postgres process")?;

    wait_for_ready(&pg_isready, port)?;

    let base_url = format!("postgres://postgres@127.0.0.1:{port}/postgres");
    let created = create_unique_database(&base_url)?;

    Ok(TestDatabase {
        connection_string: created.connection_string,
        server: Some(server),
        data_dir: Some(data_dir),
        cleanup: Some(DbCleanup {
            admin_url: created.admin_url,
            database: created.database,
        }),
    })
}

fn resolve_binary(name: &str) -> Result<PathBuf> {
    let mut search_paths: Vec<PathBuf> = Vec::new();
    // Full server installations first so initdb has its share files.
    search_paths.extend([
        PathBuf::from("/opt/homebrew/opt/postgresql@16/bin"),
        PathBuf::from("/usr/local/opt/postgresql@16/bin"),
        PathBuf::from("/usr/lib/postgresql/16/bin"),
    ]);
    search_paths.extend(
        std::env::var_os("PATH")
            .map_or_else(Vec::new, |paths| std::env::split_paths(&paths).collect()),
    );
    search_paths.extend([
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/opt/homebrew/bin"),
    ]);

    for dir in search_paths {
        let candidate = dir.join(name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    bail!("{name} binary is required for Postgres tests");
}

fn reserve_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("failed to reserve port")?;
    let port = listener
        .local_addr()
        .context("failed to read listener address")?
        .port();
    drop(listener);
    Ok(port)
}

fn create_data_dir() -> Result<PathBuf> {
    let base = PathBuf::from(".test_root/postgres");
    fs::create_dir_all(&base)
        .with_context(|| format!("failed to create base dir {}", base.display()))?;
    for attempt in 0..5 {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let candidate = base.join(format!("warren-pg-{suffix}-{attempt}"));
        if !candidate.exists() {
            fs::create_dir_all(&candidate)
                .with_context(|| format!("failed to create data dir {}", candidate.display()))?;
            return Ok(candidate);
        }
    }
    bail!("failed to allocate temporary data directory for postgres");
}

fn wait_for_ready(pg_isready: &PathBuf, port: u16) -> Result<()> {
    for _ in 0..30 {
        let status = Command::new(pg_isready)
            .args(["-h", "127.0.0.1", "-p", &port.to_string(), "-U", "postgres"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if matches!(status, Ok(ref s) if s.success()) {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(200));
    }
    bail!("postgres process did not become ready in time")
}

struct CreatedDatabase {
    connection_string: String,
    admin_url: String,
    database: String,
}

fn create_unique_database(base_url: &str) -> Result<CreatedDatabase> {
    let parsed = Url::parse(base_url).context("invalid postgres connection url")?;
    let db_name = unique_database_name();

    let mut database_url = parsed.clone();
    database_url.set_path(&format!("/{db_name}"));

    let mut last_error: Option<anyhow::Error> = None;
    for admin_url in admin_urls(&parsed) {
        match run_admin_query(&admin_url, &format!("CREATE DATABASE \"{db_name}\"")) {
            Ok(()) => {
                return Ok(CreatedDatabase {
                    connection_string: database_url.to_string(),
                    admin_url,
                    database: db_name,
                });
            }
            Err(err) => last_error = Some(err),
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("failed to create database")))
}

fn admin_urls(base: &Url) -> Vec<String> {
    let mut urls = Vec::new();
    let mut admin = base.clone();
    admin.set_path("/postgres");
    urls.push(admin.to_string());
    // Fall back to the provided database when `postgres` is not connectable.
    if admin.path() != base.path() {
        urls.push(base.to_string());
    }
    urls
}

fn drop_database(cleanup: &DbCleanup) -> Result<()> {
    run_admin_query(
        &cleanup.admin_url,
        &format!("DROP DATABASE IF EXISTS \"{}\"", cleanup.database),
    )
}

/// The blocking `postgres` client must not run on an async test runtime's
/// worker, so admin statements get a throwaway thread.
fn run_admin_query(admin_url: &str, statement: &str) -> Result<()> {
    let admin = admin_url.to_string();
    let statement = statement.to_string();
    thread::spawn(move || -> Result<()> {
        let config = postgres::Config::from_str(&admin)?;
        let mut client = config.connect(NoTls)?;
        client
            .simple_query(&statement)
            .map(|_| ())
            .context("admin statement failed")
    })
    .join()
    .unwrap_or_else(|_| Err(anyhow::anyhow!("admin query thread panicked")))?;
    Ok(())
}

fn unique_database_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    format!("warren_test_{pid}_{nanos}")
}
