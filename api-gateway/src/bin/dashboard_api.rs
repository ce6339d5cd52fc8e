//! Dashboard Lambda - Serves booking data read from the hosted spreadsheet.
//!
//! Endpoints:
//! - GET /sheetNames - Month worksheets, oldest first
//! - GET /sheetData?sheet= - Raw rows of one worksheet
//! - GET /bookedCounts - Booked rows per month worksheet
//! - GET /bookings - Paginated, sorted bookings table
//! - GET /version - Backend version

use lambda_http::{run, service_fn, Error};
use shared::{sheets, AppState, Config, Normalizer};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let config = Config::from_env()?;
    let source = sheets::from_config(&config).await?;
    let state = Arc::new(AppState::new(source, Normalizer::local(), &config));
    info!(
        "Dashboard API ready (view policy {}, excluded sheets {:?})",
        config.default_view_policy, config.excluded_sheets
    );

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { shared::api::handle(&*state, event).await }
    }))
    .await
}
