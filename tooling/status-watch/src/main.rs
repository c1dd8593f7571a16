use ethrex_status_watch::{
    alerter::{AlertError, Notifier, TelegramNotifier, WebhookNotifier},
    config::{AppConfig, NotifierConfig},
    feed::StatuspageFeed,
    service::{log_outcome, run_cycle, watch},
    storage::open_store,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(error) = run().await {
        error!(error = %error, "status-watch startup failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let config = AppConfig::from_env().map_err(|error| error.to_string())?;

    let feed = StatuspageFeed::new(config.feed_url.clone(), config.http_timeout)
        .map_err(|error| error.to_string())?;
    let store = open_store(config.store_backend, &config.store_path).map_err(|error| error.to_string())?;
    let notifier = build_notifier(&config).map_err(|error| error.to_string())?;

    if config.run_once {
        info!(feed_url = %config.feed_url, "running a single status check");
        let outcome = run_cycle(&feed, store.as_ref(), notifier.as_ref(), &config.page_url)
            .await
            .map_err(|error| error.to_string())?;
        log_outcome(&outcome);
        return Ok(());
    }

    info!(
        feed_url = %config.feed_url,
        poll_seconds = config.poll_interval.as_secs(),
        "status-watch started"
    );

    watch(
        &feed,
        store.as_ref(),
        notifier.as_ref(),
        &config.page_url,
        config.poll_interval,
        shutdown_signal(),
    )
    .await;
    info!("status-watch stopped");
    Ok(())
}

/// Completes on the first Ctrl-C. If the handler cannot be installed the
/// watcher keeps running until killed.
async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn build_notifier(config: &AppConfig) -> Result<Box<dyn Notifier>, AlertError> {
    let notifier: Box<dyn Notifier> = match &config.notifier {
        NotifierConfig::Webhook { url } => Box::new(WebhookNotifier::new(
            url.clone(),
            config.http_timeout,
            config.retry,
        )?),
        NotifierConfig::Telegram { bot_token, chat_id } => Box::new(TelegramNotifier::new(
            bot_token.clone(),
            *chat_id,
            config.retry,
        )),
    };
    Ok(notifier)
}
