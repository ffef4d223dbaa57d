#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

//! CLI entry point for the hot-item pipeline.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use dialoguer::Input;
use hot_items::config::{Backend, Config};
use hot_items::{pipeline, records};

#[derive(Parser)]
#[command(
    name = "hot_items",
    about = "Find fast-selling items in an eBay store and look up retailer prices"
)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the store, filter hot items, then search retailers (default)
    ///
    /// Hot items are found by comparing sold counters across polls, so a
    /// store needs several runs (or `poll`s) inside the window before any
    /// item can qualify. The first run on a new store only records a baseline.
    Run {
        /// eBay store name; prompted for when omitted
        store: Option<String>,
    },
    /// Scrape the store once and append to its observation log
    Poll {
        store: Option<String>,
    },
    /// Recompute hot items from the observation log and write the results CSV
    Filter {
        store: Option<String>,
    },
    /// Search retailers for every item in a results CSV
    Find {
        /// Path to a `<store>_results.csv` file
        results: PathBuf,
    },
}

/// Flags that replace values from the config file.
#[derive(Args)]
struct Overrides {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Trailing window in days
    #[arg(long, global = true)]
    days_limit: Option<i64>,
    /// Minimum quantity changes for an item to be hot
    #[arg(long, global = true)]
    min_sales: Option<usize>,
    /// Maximum hot items passed to the retailer search
    #[arg(long, global = true)]
    max_items: Option<usize>,
    /// Maximum retailer pages visited per item
    #[arg(long, global = true)]
    max_results: Option<usize>,
    /// Maximum listing pages scanned per poll
    #[arg(long, global = true)]
    max_pages: Option<u32>,
    /// Run the browser without a window
    #[arg(long, global = true)]
    headless: bool,
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,
    /// WebDriver server address
    #[arg(long, global = true)]
    webdriver_url: Option<String>,
    /// Directory for logs, results and reports
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
}

impl Overrides {
    fn resolve(self) -> Result<Config, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(days) = self.days_limit {
            config.days_limit = days;
        }
        if let Some(min) = self.min_sales {
            config.min_sales = min;
        }
        if self.max_items.is_some() {
            config.max_items = self.max_items;
        }
        if let Some(max) = self.max_results {
            config.max_results = max;
        }
        if self.max_pages.is_some() {
            config.max_pages = self.max_pages;
        }
        if self.headless {
            config.headless = true;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(url) = self.webdriver_url {
            config.webdriver_url = url;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logger() {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(log::LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.try_init().ok();
}

fn store_or_prompt(store: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(store) = store.filter(|s| !s.trim().is_empty()) {
        return Ok(store.trim().to_owned());
    }
    let store: String = Input::new()
        .with_prompt("Enter eBay store name")
        .interact_text()?;
    Ok(store.trim().to_owned())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    let cli = Cli::parse();
    let config = cli.overrides.resolve()?;

    match cli.command.unwrap_or(Commands::Run { store: None }) {
        Commands::Run { store } => {
            let store = store_or_prompt(store)?;
            pipeline::run(&config, &store).await?;
        }
        Commands::Poll { store } => {
            let store = store_or_prompt(store)?;
            let seen = pipeline::run_poll(&config, &store).await?;
            println!(
                "Recorded {} observations in {}",
                seen.len(),
                records::observation_log_path(&config.output_dir, &store).display()
            );
        }
        Commands::Filter { store } => {
            let store = store_or_prompt(store)?;
            pipeline::filter(&config, &store, Utc::now())?;
        }
        Commands::Find { results } => {
            let written = pipeline::run_find(&config, &results).await?;
            println!("Wrote {} retailer reports", written.len());
        }
    }

    Ok(())
}
