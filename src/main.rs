use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use gator::commands;
use gator::config::Config;
use gator::feed::FetchClient;
use gator::scheduler::PollScheduler;
use gator::storage::Database;
use gator::util::PollInterval;

/// Get the config directory path (~/.config/gator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

/// Create the config directory with user-only permissions.
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(config_dir, perms) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    Ok(())
}

/// Resolves once SIGINT or SIGTERM arrives.
///
/// Handlers are installed before this returns, so a signal sent while the
/// first cycle runs is not lost.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down gracefully");
        }
    })
}

#[derive(Parser, Debug)]
#[command(name = "gator", about = "RSS aggregator for the command line")]
struct Args {
    /// Act as this user instead of the configured one
    #[arg(long, global = true, value_name = "NAME")]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and make it the current one
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// List users
    Users,
    /// Add a feed and follow it
    Addfeed { name: String, url: String },
    /// List every feed
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// List followed feeds
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Poll feeds every INTERVAL (e.g. 30s, 1m, 1h) until interrupted
    Agg { interval: PollInterval },
    /// Show the newest posts from followed feeds
    Browse { limit: Option<u32> },
    /// Delete every user and everything they own
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gator=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    ensure_config_dir(&config_dir)?;
    let config_path = config_dir.join("config.toml");
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let db_path = config.database_path_in(&config_dir);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path_str)
        .await
        .context("Failed to open database")?;

    let current = args.user.clone().or_else(|| config.current_user.clone());
    let mut stdout = std::io::stdout().lock();

    match args.command {
        Command::Register { name } => {
            let user = commands::register(&db, &name).await?;
            config.current_user = Some(user.name.clone());
            config.save(&config_path).context("Failed to save config")?;
            writeln!(stdout, "User {} created", user.name)?;
        }
        Command::Login { name } => {
            let user = commands::require_user(&db, Some(&name)).await?;
            config.current_user = Some(user.name.clone());
            config.save(&config_path).context("Failed to save config")?;
            writeln!(stdout, "Logged in as {}", user.name)?;
        }
        Command::Users => {
            let users = db.get_users().await.context("Failed to list users")?;
            commands::write_users(&mut stdout, &users, current.as_deref())?;
        }
        Command::Addfeed { name, url } => {
            let user = commands::require_user(&db, current.as_deref()).await?;
            let (feed, follow) = commands::add_feed(&db, &user, &name, &url).await?;
            writeln!(stdout, "Feed {} added: {}", feed.name, feed.url)?;
            commands::write_follow(&mut stdout, &follow)?;
        }
        Command::Feeds => {
            let feeds = db.get_feeds().await.context("Failed to list feeds")?;
            commands::write_feeds(&mut stdout, &feeds)?;
        }
        Command::Follow { url } => {
            let user = commands::require_user(&db, current.as_deref()).await?;
            let follow = commands::follow(&db, &user, &url).await?;
            commands::write_follow(&mut stdout, &follow)?;
        }
        Command::Following => {
            let user = commands::require_user(&db, current.as_deref()).await?;
            let follows = db
                .get_feed_follows_for_user(user.id)
                .await
                .context("Failed to list follows")?;
            commands::write_following(&mut stdout, &follows)?;
        }
        Command::Unfollow { url } => {
            let user = commands::require_user(&db, current.as_deref()).await?;
            commands::unfollow(&db, &user, &url).await?;
            writeln!(stdout, "{} unfollowed {}", user.name, url)?;
        }
        Command::Agg { interval } => {
            let client = FetchClient::new(config.request_timeout())
                .context("Failed to build HTTP client")?;
            let shutdown = shutdown_signal()?;
            let scheduler = PollScheduler::new(db.clone(), client, interval);
            let summary = scheduler.run_until(shutdown).await;
            tracing::info!(
                cycles = summary.cycles,
                failures = summary.failures,
                "Aggregator stopped"
            );
        }
        Command::Browse { limit } => {
            let user = commands::require_user(&db, current.as_deref()).await?;
            let limit = limit.unwrap_or(config.browse_limit);
            let posts = db
                .get_posts_for_user(user.id, i64::from(limit))
                .await
                .context("Failed to load posts")?;
            commands::write_posts(&mut stdout, &posts)?;
        }
        Command::Reset => {
            let removed = db.reset().await.context("Failed to reset database")?;
            writeln!(stdout, "Reset complete: {removed} users removed")?;
        }
    }

    Ok(())
}
