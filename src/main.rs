// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use permit_queue::{
    get_queue_entries, import_accounts, load_accounts_csv, telemetry, upsert_permit,
    PermitQueueConfig, PermitRecord, QueueNumber, QueueSequencer, SqliteStore,
};

#[derive(Debug, Parser)]
#[command(name = "permit-queue", version, about = "Campus permit-claiming queue kiosk")]
struct Cli {
    /// TOML config file (defaults to ./permit-queue.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scan-and-queue / print-permit kiosk (default)
    Ui,
    /// Import the student account roster from CSV
    ImportAccounts {
        /// CSV with columns secret,name,email,studentNumber,cellphoneNumber
        csv: PathBuf,
    },
    /// Create or update the permit issued for a queue number
    SetPermit {
        queue_number: String,
        status: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        student: String,
    },
    /// Print the next queue number without reserving it
    Next,
    /// List every claim in the queue
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PermitQueueConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let command = cli.command.unwrap_or(Command::Ui);
    if !matches!(command, Command::Ui) {
        telemetry::init_tracing(&config.log.level, cli.verbose)?;
    }

    run_command(command, &config, cli.verbose)
}

fn open_store(config: &PermitQueueConfig) -> Result<SqliteStore> {
    SqliteStore::open(&config.store.path)
        .with_context(|| format!("failed to open {}", config.store.path.display()))
}

fn run_command(command: Command, config: &PermitQueueConfig, verbose: bool) -> Result<()> {
    match command {
        Command::Ui => run_ui_mode(config, verbose),
        Command::ImportAccounts { csv } => run_import(&open_store(config)?, &csv),
        Command::SetPermit {
            queue_number,
            status,
            name,
            student,
        } => {
            let number = QueueNumber::parse(&queue_number)?;
            let permit = PermitRecord {
                user_name: name,
                user_student_number: student,
                permit_status: status,
                timestamp: Utc::now().to_rfc3339(),
            };
            open_store(config)?.with_connection(|conn| upsert_permit(conn, number, &permit))?;
            println!("✓ Permit for {} set to '{}'", number, permit.permit_status);
            Ok(())
        }
        Command::Next => {
            let store = open_store(config)?;
            let next = QueueSequencer::new(&store).next_queue_number()?;
            println!("{}", next);
            Ok(())
        }
        Command::List => {
            let entries = open_store(config)?.with_connection(get_queue_entries)?;
            for entry in &entries {
                println!(
                    "{}  {:<10}  {:<12}  {}  {}",
                    entry.queue_number,
                    entry.status.as_str(),
                    entry.user_student_number,
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.user_name,
                );
            }
            println!("{} claim(s) in queue", entries.len());
            Ok(())
        }
    }
}

fn run_import(store: &SqliteStore, csv_path: &Path) -> Result<()> {
    println!("📂 Loading roster {}...", csv_path.display());
    let rows = load_accounts_csv(csv_path)?;
    println!("✓ Read {} rows", rows.len());

    let imported = store.with_connection(|conn| import_accounts(conn, &rows))?;
    println!("✓ Imported {} accounts", imported);
    if imported < rows.len() {
        println!("⚠️  Skipped {} incomplete rows", rows.len() - imported);
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &PermitQueueConfig, verbose: bool) -> Result<()> {
    use permit_queue::QueueService;
    use std::sync::Arc;

    let log_path = config.store.path.with_file_name("permit-queue.log");
    telemetry::init_tracing_to_file(&config.log.level, verbose, &log_path)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let service = Arc::new(
        QueueService::from_config(config)
            .with_context(|| format!("failed to open {}", config.store.path.display()))?,
    );

    let mut app = ui::App::new(service, runtime.handle().clone());
    ui::run_ui(&mut app)?;

    println!("✅ Kiosk closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &PermitQueueConfig, _verbose: bool) -> Result<()> {
    eprintln!("❌ Kiosk mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin permit-server --features server");
    std::process::exit(1);
}
