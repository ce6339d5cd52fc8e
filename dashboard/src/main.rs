//! # dashboard
//!
//! Terminal view of booking status, backed by the dashboard API.

mod app;
mod client;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use shared::models::Column;
use shared::normalize::Normalizer;
use shared::refresh::{Loader, RefreshQueue, DEFAULT_DEBOUNCE};
use shared::sheets::http_client;
use shared::view::{DefaultViewPolicy, PageNav, SortDirection, SortState, ViewController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use app::Dashboard;
use client::DashboardApi;

/// dashboard - booking status at a glance
#[derive(Parser)]
#[command(name = "dashboard")]
#[command(author, version, about = "Booking status dashboard", long_about = None)]
struct Cli {
    /// Base URL of the dashboard API, e.g. https://host/api
    #[arg(long, value_name = "URL")]
    api: String,

    /// Show a single month sheet instead of upcoming bookings
    #[arg(long)]
    sheet: Option<String>,

    /// Rows per page
    #[arg(long, default_value_t = 15)]
    page_size: usize,

    /// Page to show
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Column to sort by (email, name, date, start, end, booked, site, account, ticket, mid)
    #[arg(long)]
    sort: Option<Column>,

    /// Sort descending
    #[arg(long)]
    desc: bool,

    /// Redraw every SECS seconds until Ctrl-C
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,

    /// How far ahead the upcoming view reaches (end-of-year, end-of-month)
    #[arg(long, default_value = "end-of-year")]
    policy: DefaultViewPolicy,

    /// Only show booked rows in single-month view
    #[arg(long)]
    booked_only: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let http = http_client().context("Failed to build HTTP client")?;
    let api = DashboardApi::new(http, &cli.api);

    let mut view = ViewController::new(cli.policy, cli.booked_only);
    view.set_page_size(cli.page_size);
    if let Some(column) = cli.sort {
        let direction = if cli.desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        view.set_sort(SortState { column, direction });
    }

    let mut dashboard = Dashboard::new(api, Normalizer::local(), view);
    dashboard.load_cards().await;
    if let Some(sheet) = &cli.sheet {
        dashboard.select_month(sheet);
    }
    dashboard.view_mut().navigate(PageNav::To(cli.page));

    match cli.watch {
        None => {
            println!("{}", dashboard.refresh().await);
            Ok(())
        }
        Some(secs) => watch(dashboard, Duration::from_secs(secs.max(1))).await,
    }
}

/// Redraw on an interval until Ctrl-C.
async fn watch(dashboard: Dashboard<chrono::Local>, every: Duration) -> Result<()> {
    let dashboard = Arc::new(Mutex::new(dashboard));
    let loader = Loader::new();

    let queue = {
        let dashboard = Arc::clone(&dashboard);
        RefreshQueue::spawn(DEFAULT_DEBOUNCE, loader.clone(), move || {
            let dashboard = Arc::clone(&dashboard);
            async move {
                let screen = dashboard.lock().await.refresh().await;
                // Clear the terminal before redrawing
                print!("\x1B[2J\x1B[H");
                println!("{}", screen);
            }
        })
    };

    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if loader.is_visible() {
                    info!("Refresh still running; coalescing");
                }
                queue.trigger();
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    info!("Stopping");
    queue.shutdown().await;
    Ok(())
}
