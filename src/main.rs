use std::io;
use std::path::PathBuf;
use std::sync::Arc;

mod assets;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod sync;
mod text;

use assets::{HttpDownloader, Localizer, Reaper};
use config::Config;
use db::Repository;
use error::{AppError, Result};
use feed::FeedFetcher;
use sync::{SyncReport, SyncStatus, Synchronizer};

enum Command {
    SyncAll,
    Sync(i64),
    DeleteRecord(i64),
    DeleteSourceRecords(i64),
    ImportOpml(PathBuf, i64),
    SetSourceEnabled(i64, bool),
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_logging(&config);

    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let json = args.iter().any(|arg| arg == "--json");
    let args: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|arg| *arg != "--json")
        .collect();
    let command = parse_command(&args)?;

    if let Some(dir) = config.database.path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let repo = Arc::new(Repository::new(&config.database.path).await?);
    let reaper = Reaper::new(repo.clone(), config.storage.root.clone());

    match command {
        Command::SyncAll => {
            let sync = build_synchronizer(&config, repo, reaper)?;
            let reports = sync.sync_all().await?;
            print_reports(&reports, json)?;
        }
        Command::Sync(source_id) => {
            let sync = build_synchronizer(&config, repo, reaper)?;
            let report = sync.sync_source_by_id(source_id).await;
            print_reports(&[report], json)?;
        }
        Command::DeleteRecord(record_id) => {
            if repo.get_record(record_id).await?.is_none() {
                println!("Record {} not found", record_id);
                return Ok(());
            }
            let report = reaper.delete_record(record_id).await?;
            println!("Deleted record {}, removed {} files", record_id, report.removed.len());
        }
        Command::DeleteSourceRecords(source_id) => {
            let report = reaper.delete_source_records(source_id).await?;
            println!(
                "Deleted records of source {}, removed {} files",
                source_id,
                report.removed.len()
            );
        }
        Command::ImportOpml(path, archive_id) => {
            let sources =
                feed::parse_opml_file(&path, archive_id, &config.storage.default_files_path)?;
            let count = sources.len();
            for source in sources {
                repo.insert_source(source).await?;
            }
            println!("Imported {} sources from {:?}", count, path);
        }
        Command::SetSourceEnabled(source_id, enabled) => {
            repo.set_source_enabled(source_id, enabled).await?;
            println!(
                "Source {} {}",
                source_id,
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }

    Ok(())
}

fn parse_command(args: &[&str]) -> Result<Command> {
    let id = |value: Option<&&str>, flag: &str| -> Result<i64> {
        value
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| AppError::Configuration(format!("{flag} expects a numeric id")))
    };

    match args.first().copied() {
        None | Some("--sync-all") => Ok(Command::SyncAll),
        Some("--sync") => Ok(Command::Sync(id(args.get(1), "--sync")?)),
        Some("--delete-record") => Ok(Command::DeleteRecord(id(args.get(1), "--delete-record")?)),
        Some("--delete-source-records") => Ok(Command::DeleteSourceRecords(id(
            args.get(1),
            "--delete-source-records",
        )?)),
        Some("--import-opml") => {
            let path = args.get(1).ok_or_else(|| {
                AppError::Configuration("--import-opml expects a file and an archive id".to_string())
            })?;
            Ok(Command::ImportOpml(
                PathBuf::from(*path),
                id(args.get(2), "--import-opml")?,
            ))
        }
        Some("--enable-source") => Ok(Command::SetSourceEnabled(
            id(args.get(1), "--enable-source")?,
            true,
        )),
        Some("--disable-source") => Ok(Command::SetSourceEnabled(
            id(args.get(1), "--disable-source")?,
            false,
        )),
        Some(other) => Err(AppError::Configuration(format!("unknown argument {other}"))),
    }
}

fn build_synchronizer(config: &Config, repo: Arc<Repository>, reaper: Reaper) -> Result<Synchronizer> {
    let fetcher = FeedFetcher::new(&config.http)?;
    let downloader = Arc::new(HttpDownloader::new(&config.http)?);
    let localizer = Localizer::new(repo.clone(), downloader, &config.storage);
    Ok(Synchronizer::new(repo, fetcher, localizer, reaper, &config.sync))
}

fn print_reports(reports: &[SyncReport], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
        return Ok(());
    }

    for report in reports {
        match &report.status {
            SyncStatus::Completed => println!(
                "Source {}: {} items read, {} new, {} updated ({})",
                report.source_id, report.read, report.inserted, report.updated, report.url
            ),
            SyncStatus::Skipped { reason } => {
                println!("Source {}: skipped, {}", report.source_id, reason)
            }
            SyncStatus::Failed { reason } => {
                println!("Source {}: failed, {}", report.source_id, reason)
            }
        }
    }
    Ok(())
}

fn init_logging(config: &Config) {
    // Log to stderr, and also append to the configured log file
    use std::fs::OpenOptions;
    use std::io::Write;
    use tracing_subscriber::fmt::MakeWriter;

    let log_file = config.log.file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(Arc::new(std::sync::Mutex::new(file))),
            Err(err) => {
                eprintln!("Warning: unable to open {}: {err}", path.display());
                None
            }
        }
    });

    struct DualWriter {
        file: Option<Arc<std::sync::Mutex<std::fs::File>>>,
    }

    impl Write for DualWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(file) = &self.file {
                if let Ok(mut file) = file.lock() {
                    let _ = file.write_all(buf);
                }
            }
            std::io::stderr().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            if let Some(file) = &self.file {
                if let Ok(mut file) = file.lock() {
                    let _ = file.flush();
                }
            }
            std::io::stderr().flush()
        }
    }

    impl<'a> MakeWriter<'a> for DualWriter {
        type Writer = DualWriter;

        fn make_writer(&'a self) -> Self::Writer {
            DualWriter {
                file: self.file.clone(),
            }
        }
    }

    let dual_writer = DualWriter { file: log_file };

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());
    if let Ok(directive) = "rss_import=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(dual_writer)
        .init();
}
