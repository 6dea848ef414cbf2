use anyhow::{Context, Result};
use bazaar::app::{App, AppEvent};
use bazaar::backend::{RestClient, RetryPolicy};
use bazaar::config::{Config, ANON_KEY_ENV};
use bazaar::listing::Category;
use bazaar::ui;
use clap::Parser;
use secrecy::SecretString;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Env var holding the password for `--email` sign-in.
const PASSWORD_ENV: &str = "BAZAAR_PASSWORD";

/// Get the config directory path (~/.config/bazaar/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("bazaar"))
}

#[derive(Parser, Debug)]
#[command(name = "bazaar", about = "Terminal marketplace browser")]
struct Args {
    /// Config file (default: ~/.config/bazaar/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend URL, overrides the config file
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Start the market feed filtered to one category
    #[arg(long, value_name = "TAG", value_parser = parse_category)]
    category: Option<Category>,

    /// Listings per page
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..=1000))]
    page_size: Option<u16>,

    /// Sign in as this user (password from BAZAAR_PASSWORD) to enable "My listings"
    #[arg(long, value_name = "ADDR")]
    email: Option<String>,
}

fn parse_category(s: &str) -> Result<Category, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // CLI flags win over the file
    if let Some(endpoint) = args.endpoint {
        config.endpoint = Some(endpoint);
    }
    if let Some(category) = args.category {
        config.category = Some(category);
    }
    if let Some(page_size) = args.page_size {
        config.page_size = usize::from(page_size);
    }
    tracing::debug!(?config, "Effective configuration");

    let endpoint = config.endpoint.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "No backend endpoint configured: pass --endpoint or set `endpoint` in {}",
            config_path.display()
        )
    })?;
    let anon_key = config.resolve_anon_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured: set {} or `anon_key` in {}",
            ANON_KEY_ENV,
            config_path.display()
        )
    })?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("bazaar/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(4)
        .build()
        .context("Failed to build HTTP client")?;

    let mut client = RestClient::new(http, &endpoint, anon_key)
        .with_context(|| format!("Invalid backend endpoint '{}'", endpoint))?
        .with_timeout(config.request_timeout())
        .with_retry_policy(RetryPolicy {
            max_retries: config.max_retries,
            ..RetryPolicy::default()
        });

    if let Some(email) = &args.email {
        let password = std::env::var(PASSWORD_ENV)
            .map(SecretString::from)
            .with_context(|| format!("--email requires the {} environment variable", PASSWORD_ENV))?;
        let session = client
            .sign_in(email, &password)
            .await
            .with_context(|| format!("Sign-in failed for {}", email))?;
        println!("Signed in as {}", session.email().unwrap_or(email));
        client = client.with_session(session);
    }

    let cache_size = NonZeroUsize::new(config.detail_cache_size).unwrap_or(NonZeroUsize::MIN);
    let mut app = App::new(
        Arc::new(client),
        config.sync_options(),
        config.category,
        cache_size,
    );

    let (event_tx, event_rx) = mpsc::channel::<AppEvent>(32);

    ui::run(&mut app, event_tx, event_rx).await?;

    println!("Goodbye!");
    Ok(())
}
