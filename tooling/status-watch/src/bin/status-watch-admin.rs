use clap::{Parser, Subcommand};
use ethrex_status_watch::{
    config::{DEFAULT_FEED_URL, DEFAULT_PAGE_URL},
    feed::{IncidentFeed, StatuspageFeed},
    service::alert_message,
    storage::{SnapshotStore, StoreBackend, open_store},
    tracker,
};
use std::{path::PathBuf, process::ExitCode, time::Duration};

#[derive(Parser)]
#[command(
    name = "status-watch-admin",
    about = "Inspect and reset the status-watch snapshot"
)]
struct Cli {
    #[arg(long, env = "STATUS_WATCH_STORE", default_value = "sqlite", value_parser = parse_backend)]
    /// Snapshot store backend (sqlite or file)
    store: StoreBackend,
    #[arg(long = "store-path", env = "STATUS_WATCH_STORE_PATH")]
    /// Snapshot location; defaults to the backend's standard file name
    store_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the ids stored by the last cycle
    Show,
    /// Forget the stored snapshot so the next cycle starts from a cold baseline
    Clear,
    /// Poll the feed and show what the next cycle would decide, without
    /// notifying or writing the snapshot
    Check {
        #[arg(long = "feed-url", env = "STATUS_WATCH_FEED_URL", default_value = DEFAULT_FEED_URL)]
        feed_url: String,
        #[arg(long = "page-url", env = "STATUS_WATCH_PAGE_URL", default_value = DEFAULT_PAGE_URL)]
        page_url: String,
        #[arg(long = "timeout-seconds", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
        timeout_seconds: u64,
    },
}

fn parse_backend(raw: &str) -> Result<StoreBackend, String> {
    StoreBackend::parse(raw).ok_or_else(|| format!("unknown store backend {raw:?}, expected sqlite or file"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let path = cli
        .store_path
        .unwrap_or_else(|| PathBuf::from(cli.store.default_path()));

    let store = match open_store(cli.store, &path) {
        Ok(store) => store,
        Err(error) => {
            eprintln!("failed to open snapshot store {}: {error}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Show => show(store.as_ref()),
        Command::Clear => store
            .clear()
            .map(|()| println!("snapshot cleared"))
            .map_err(|error| format!("failed to clear snapshot: {error}")),
        Command::Check {
            feed_url,
            page_url,
            timeout_seconds,
        } => check(store.as_ref(), feed_url, &page_url, Duration::from_secs(timeout_seconds)).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn show(store: &dyn SnapshotStore) -> Result<(), String> {
    match store.read() {
        Ok(Some(snapshot)) => {
            match store.written_at() {
                Ok(Some(seconds)) => println!("written at unix time {seconds}"),
                Ok(None) => {}
                Err(error) => return Err(format!("failed to read snapshot write time: {error}")),
            }
            println!("{} active incident(s)", snapshot.len());
            for id in snapshot.iter() {
                println!("  {id}");
            }
            Ok(())
        }
        Ok(None) => {
            println!("no snapshot stored (cold baseline)");
            Ok(())
        }
        Err(error) => Err(format!("failed to read snapshot: {error}")),
    }
}

async fn check(
    store: &dyn SnapshotStore,
    feed_url: String,
    page_url: &str,
    timeout: Duration,
) -> Result<(), String> {
    let feed = StatuspageFeed::new(feed_url, timeout).map_err(|error| error.to_string())?;
    let report = feed
        .fetch_unresolved()
        .await
        .map_err(|error| format!("failed to poll {}: {error}", feed.url()))?;
    let previous = store
        .read()
        .map_err(|error| format!("failed to read snapshot: {error}"))?;

    let evaluation = tracker::evaluate(previous.as_ref(), &report.incidents);

    for rejected in &evaluation.rejected {
        println!("skipped: {rejected}");
    }
    for id in evaluation.snapshot.iter().chain(&evaluation.resolved) {
        println!("#{id} [{}]", evaluation.state_of(id));
    }

    match alert_message(&report, &evaluation, page_url) {
        Some(message) => println!("would alert:\n{}", message.render()),
        None => println!("no alert"),
    }

    Ok(())
}
