// src/scheduler.rs
//! Wall-clock jobs in the configured timezone: the daily cron-mode scrape (12:01, previous
//! calendar day) and the weekly relevance decay (Sunday 00:00).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::decay::decay_relevance;
use crate::pipeline::{Pipeline, RunOptions};
use crate::store::ArticleStore;

pub const DAILY_SCRAPE_AT: (u32, u32) = (12, 1);
pub const WEEKLY_DECAY_ON: Weekday = Weekday::Sun;

pub fn parse_timezone(name: &str) -> Tz {
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!(target: "news_scrape", timezone = name, "unknown timezone; falling back to America/Los_Angeles");
        chrono_tz::America::Los_Angeles
    })
}

/// Local wall time on `date` as UTC. A time skipped by a DST jump resolves an hour later.
fn local_to_utc(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive).earliest() {
        Some(t) => t.with_timezone(&Utc),
        None => tz
            .from_local_datetime(&(naive + chrono::Duration::hours(1)))
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
    }
}

/// First `hour:minute` local strictly after `now`.
pub fn next_daily_run(now: DateTime<Utc>, tz: Tz, hour: u32, minute: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let mut date = now.with_timezone(&tz).date_naive();
    loop {
        let at = local_to_utc(tz, date, time);
        if at > now {
            return at;
        }
        date = date + Days::new(1);
    }
}

/// First `weekday hour:minute` local strictly after `now`.
pub fn next_weekly_run(
    now: DateTime<Utc>,
    tz: Tz,
    weekday: Weekday,
    hour: u32,
    minute: u32,
) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let mut date = now.with_timezone(&tz).date_naive();
    loop {
        if date.weekday() == weekday {
            let at = local_to_utc(tz, date, time);
            if at > now {
                return at;
            }
        }
        date = date + Days::new(1);
    }
}

/// The previous calendar day in `tz`.
pub fn previous_day(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    let today = now.with_timezone(&tz).date_naive();
    today.pred_opt().unwrap_or(today)
}

fn until(at: DateTime<Utc>) -> Duration {
    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

/// Cron-mode scrape of the previous local day. Failures are logged; the loop keeps going.
pub fn spawn_daily_scrape(pipeline: Arc<Pipeline>, tz: Tz) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (hour, minute) = DAILY_SCRAPE_AT;
        loop {
            let next = next_daily_run(Utc::now(), tz, hour, minute);
            info!(target: "news_scrape", next = %next, "daily scrape scheduled");
            tokio::time::sleep(until(next)).await;

            let day = previous_day(Utc::now(), tz);
            info!(target: "news_scrape", %day, "starting daily news scrape");
            counter!("scheduler_runs_total", "job" => "daily_scrape").increment(1);
            match pipeline.run(day, day, RunOptions::cron()).await {
                Ok(stats) => info!(
                    target: "news_scrape",
                    inserted = stats.inserted,
                    zero_reason = ?stats.zero_reason,
                    "daily news scrape completed"
                ),
                Err(e) => error!(
                    target: "news_scrape",
                    error = %e,
                    fetched = e.stats().fetched_total,
                    "daily news scrape failed"
                ),
            }
        }
    })
}

pub fn spawn_weekly_decay(store: Arc<dyn ArticleStore>, tz: Tz) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next = next_weekly_run(Utc::now(), tz, WEEKLY_DECAY_ON, 0, 0);
            info!(target: "store", next = %next, "relevance decay scheduled");
            tokio::time::sleep(until(next)).await;

            counter!("scheduler_runs_total", "job" => "relevance_decay").increment(1);
            if let Err(e) = decay_relevance(store.as_ref()).await {
                error!(target: "store", error = %format!("{e:#}"), "relevance decay failed");
            }
        }
    })
}
