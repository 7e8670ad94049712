use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_alarm::{
    agent::Agent,
    alert::AlertState,
    config::{self, AgentConfig},
    control::ControlChannel,
    db::Store,
    effects::CommandEffects,
    feed::FeedClient,
    health::{Health, SystemdNotifier},
};

#[derive(Parser)]
#[command(name = "feed-alarm")]
#[command(about = "Sound an alarm for top-priority feed messages until silenced")]
struct Cli {
    /// Feed (topic) identifier
    #[arg(long, env = "ID")]
    id: String,

    /// Base URL of the feed server
    #[arg(long, env = "FEED_ENDPOINT", default_value = config::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Directory holding the database, message log and quiet sentinel
    #[arg(long, env = "FEED_ALARM_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Seconds without data before a feed read gives up
    #[arg(long, default_value_t = config::DEFAULT_READ_TIMEOUT.as_secs())]
    read_timeout: u64,

    /// Command that plays the alarm sound once
    #[arg(long, num_args = 1.., value_delimiter = ' ')]
    alarm_command: Option<Vec<String>>,

    /// Desktop notification program
    #[arg(long, default_value = "/usr/bin/notify-send")]
    notify_command: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<AgentConfig> {
        let state_dir = match self.state_dir {
            Some(dir) => dir,
            None => config::default_state_dir()?,
        };
        let mut config = AgentConfig::new(self.endpoint, self.id, state_dir);
        config.read_timeout = Duration::from_secs(self.read_timeout);
        if let Some(command) = self.alarm_command {
            config.alarm_command = command;
        }
        config.notify_command = self.notify_command;
        Ok(config)
    }
}

/// Initialize tracing with output to stderr
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "feed_alarm=debug"
    } else {
        "feed_alarm=info"
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::warn!("Log started");

    let config = cli.into_config()?;
    config.paths.prepare()?;

    let store = Store::open(config.paths.database())?;
    store.migrate()?;
    let store = Arc::new(store);

    let health: Arc<dyn Health> = Arc::new(SystemdNotifier::from_env());
    let effects = Arc::new(CommandEffects::new(
        config.alarm_command.clone(),
        config.notify_command.clone(),
    ));
    let alert = Arc::new(AlertState::recover(
        store.clone(),
        effects,
        health.clone(),
        config.paths.clone(),
    )?);
    let control = ControlChannel::new(config.paths.clone(), alert.clone());
    let source = Arc::new(FeedClient::new(config.clone())?);

    let agent = Agent::new(source, store.clone(), alert, control, health, config.limits);

    tokio::select! {
        result = agent.run() => {
            if let Err(ref e) = result {
                tracing::error!("Uncaught error: {:?}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::error!("Shutting down - interrupted");
            store.dump()
        }
    }
}
