//! Dashboard state: scorecards plus the bookings table for the current view.

use chrono::{DateTime, TimeZone, Utc};
use shared::aggregate::collect_rows;
use shared::config::DEFAULT_EXCLUDED_SHEETS;
use shared::normalize::Normalizer;
use shared::view::{TablePage, ViewController, ViewEvent};
use std::fmt;
use tracing::{debug, info, warn};

use crate::client::DashboardApi;
use crate::render::{self, SCORECARD_ERROR};

pub struct Dashboard<Tz: TimeZone> {
    api: DashboardApi,
    normalizer: Normalizer<Tz>,
    view: ViewController,
    excluded: Vec<String>,
    cards: String,
}

impl<Tz> Dashboard<Tz>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: fmt::Display,
{
    pub fn new(api: DashboardApi, normalizer: Normalizer<Tz>, view: ViewController) -> Self {
        Self {
            api,
            normalizer,
            view,
            excluded: DEFAULT_EXCLUDED_SHEETS.iter().map(|s| s.to_string()).collect(),
            cards: String::new(),
        }
    }

    pub fn view_mut(&mut self) -> &mut ViewController {
        &mut self.view
    }

    /// Switch to a single month. Unknown names leave the view unchanged.
    pub fn select_month(&mut self, name: &str) -> bool {
        let known = self.view.handle(ViewEvent::SelectMonth(name.to_string()));
        if !known {
            warn!("Sheet {:?} is not a month sheet; showing upcoming bookings", name);
        }
        known
    }

    /// Fetch the scorecards. Returns true when they changed since the last call.
    pub async fn load_cards(&mut self) -> bool {
        match self.api.booked_counts().await {
            Ok(counts) => {
                if !self.view.apply_counts(&counts) {
                    debug!("Scorecards unchanged");
                    return false;
                }
                info!("Loaded {} scorecards", counts.len());
                self.cards = render::cards(&counts);
                true
            }
            Err(e) => {
                warn!("Failed to load booked counts: {}", e);
                self.view.forget_counts();
                self.cards = SCORECARD_ERROR.to_string();
                true
            }
        }
    }

    /// Fetch rows for the current view and render the current page.
    pub async fn load_table(&mut self, now: DateTime<Utc>) -> TablePage {
        let rows = match collect_rows(
            &self.api,
            &self.normalizer,
            &self.excluded,
            self.view.mode(),
            now,
        )
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Failed to load rows: {}", e);
                Vec::new()
            }
        };

        let window = self.view.window(&self.normalizer, now);
        let rows = self.view.select_rows(rows, &window);
        self.view.render(&rows)
    }

    pub async fn refresh_at(&mut self, now: DateTime<Utc>) -> String {
        self.load_cards().await;
        let page = self.load_table(now).await;
        render::screen(&self.cards, &page, &self.normalizer.zone_label(now))
    }

    pub async fn refresh(&mut self) -> String {
        self.refresh_at(Utc::now()).await
    }
}
