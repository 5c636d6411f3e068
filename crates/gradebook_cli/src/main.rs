//! Operator entry point for grade reconciliation.
//!
//! # Responsibility
//! - Open a grade database, back it up, and run one or all passes.
//! - Print one counts line per pass, or the reports as JSON.
//!
//! # Invariants
//! - Dry runs never write the database or a backup.
//! - The database must already exist; the CLI never creates one.
//! - The exit code is non-zero only when the store or config is unusable;
//!   issues found by a pass are reported, not treated as failure.

use clap::{Parser, ValueEnum};
use gradebook_core::db::{backup_before_modification, open_db, DbError};
use gradebook_core::{
    default_log_level, flush_logging, init_logging, ConfigError, PassKind, PassReport,
    ReconcileConfig, ReconcileError, Reconciler, RepoError, SqliteGradeStore,
};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Reconcile the analogue graph, duplicates, chemistry and standard fields
/// of a material grade database.
#[derive(Parser, Debug)]
#[command(name = "gradebook", version)]
struct Args {
    /// SQLite grade database
    db: PathBuf,

    /// Pass to run
    #[arg(value_enum)]
    pass: PassArg,

    /// TOML file with pass settings (defaults apply to missing fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Compute and report mutations without applying them
    #[arg(long)]
    dry_run: bool,

    /// Print reports as JSON instead of summary lines
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log directory (defaults to `logs` next to the database)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Backup directory (defaults to `backups` next to the database)
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Number of backups to keep (0 keeps all)
    #[arg(long, default_value_t = 3)]
    keep_backups: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PassArg {
    Closure,
    Duplicates,
    Chemistry,
    Tokens,
    Standards,
    All,
}

impl PassArg {
    fn pass_kind(self) -> Option<PassKind> {
        match self {
            Self::Closure => Some(PassKind::Closure),
            Self::Duplicates => Some(PassKind::Duplicates),
            Self::Chemistry => Some(PassKind::Chemistry),
            Self::Tokens => Some(PassKind::Tokens),
            Self::Standards => Some(PassKind::Standards),
            Self::All => None,
        }
    }
}

#[derive(Debug)]
enum CliError {
    /// The database path does not name an existing file.
    MissingDatabase(PathBuf),
    Logging(String),
    Config(ConfigError),
    Db(DbError),
    Store(RepoError),
    Reconcile(ReconcileError),
    Output(serde_json::Error),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDatabase(path) => {
                write!(f, "database file not found: {}", path.display())
            }
            Self::Logging(message) => write!(f, "logging setup failed: {message}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "database error: {err}"),
            Self::Store(err) => write!(f, "grade store error: {err}"),
            Self::Reconcile(err) => write!(f, "{err}"),
            Self::Output(err) => write!(f, "cannot encode report: {err}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MissingDatabase(_) => None,
            Self::Logging(_) => None,
            Self::Config(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Reconcile(err) => Some(err),
            Self::Output(err) => Some(err),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for CliError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

impl From<ReconcileError> for CliError {
    fn from(value: ReconcileError) -> Self {
        Self::Reconcile(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Output(value)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let outcome = run(&args);
    if let Err(err) = &outcome {
        error!("event=cli_exit module=cli status=error error={}", err);
        eprintln!("gradebook: {err}");
    }
    flush_logging();
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let db_dir = database_dir(&args.db);
    let log_dir = absolute(args.log_dir.clone().unwrap_or_else(|| db_dir.join("logs")));
    let level = args.log_level.as_deref().unwrap_or(default_log_level());
    init_logging(level, &log_dir.to_string_lossy()).map_err(CliError::Logging)?;

    let mut config = match args.config.as_ref() {
        Some(path) => ReconcileConfig::load(path)?,
        None => ReconcileConfig::default(),
    };
    config.dry_run |= args.dry_run;

    // Why: `open_db` creates missing files, and a mistyped path would then
    // report a clean zero-mutation run against an empty database.
    ensure_database_exists(&args.db)?;
    let conn = open_db(&args.db)?;
    if !config.dry_run {
        let backup_dir = args.backup_dir.clone().unwrap_or_else(|| db_dir.join("backups"));
        let reason = format!("{:?}", args.pass).to_lowercase();
        let backup = backup_before_modification(&conn, &backup_dir, &reason, args.keep_backups)?;
        info!(
            "event=cli_backup module=cli status=ok path={}",
            backup.display()
        );
    }

    let store = SqliteGradeStore::try_new(&conn)?;
    let reconciler = Reconciler::new(&store, config)?;
    let reports = match args.pass.pass_kind() {
        Some(pass) => vec![reconciler.run_pass(pass)?],
        None => reconciler.run_all()?,
    };

    print_reports(&reports, args.json)
}

fn print_reports(reports: &[PassReport], json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
        return Ok(());
    }
    for report in reports {
        println!("{report}");
        for issue in &report.issues {
            println!("  {}", serde_json::to_string(issue)?);
        }
    }
    Ok(())
}

fn ensure_database_exists(db: &Path) -> Result<(), CliError> {
    if db.is_file() {
        return Ok(());
    }
    Err(CliError::MissingDatabase(db.to_path_buf()))
}

fn database_dir(db: &Path) -> PathBuf {
    match db.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
}
