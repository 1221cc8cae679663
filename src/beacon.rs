use crate::aprs::{self, Address, Frame};
use crate::config::Config;
use crate::influx::InfluxReader;
use crate::wx::{self, CycleOutcome};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Drives the poll -> transform -> dedupe -> transmit loop. The first cycle
/// fires immediately; each later cycle waits out one full interval after
/// the previous cycle's work returns. In single-shot mode the function
/// returns after the first successfully transmitted report; otherwise it
/// never returns.
pub async fn run(config: &Config, reader: &InfluxReader, once: bool) -> Result<()> {
    let interval = config.poll_interval()?;
    let lookback = interval * 2;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_seen: Option<DateTime<Utc>> = None;

    loop {
        ticker.tick().await;
        let sent = run_cycle(config, reader, lookback, &mut last_seen).await;
        if sent && once {
            tracing::info!("single-shot report transmitted");
            return Ok(());
        }
    }
}

/// One cycle: query, assemble, maybe transmit. Returns whether a report
/// went out. Query and send failures are logged and absorbed here; they
/// never stop the scheduler.
async fn run_cycle(
    config: &Config,
    reader: &InfluxReader,
    lookback: Duration,
    last_seen: &mut Option<DateTime<Utc>>,
) -> bool {
    let samples = match reader.query_latest(lookback).await {
        Ok(samples) => samples,
        Err(err) => {
            tracing::error!(error = %err, "influxdb query failed");
            return false;
        }
    };

    match wx::assemble(samples, *last_seen, config.lat, config.lon, &config.comment) {
        CycleOutcome::Duplicate(time) => {
            tracing::debug!(timestamp = %time, "skipping already-observed timestamp");
            false
        }
        CycleOutcome::Empty => {
            tracing::debug!("no new samples this cycle");
            false
        }
        CycleOutcome::Report(report) => {
            // Dedup state commits before the transmit attempt; a send
            // failure does not roll it back.
            *last_seen = report.time;
            tracing::debug!(?report, "assembled observation");

            let frame = Frame {
                source: Address {
                    call: config.callsign.clone(),
                    ssid: config.ssid,
                },
                text: aprs::weather_report(&report),
            };
            match aprs::send_is(&frame).await {
                Ok(()) => {
                    tracing::info!(frame = %frame, "sent to APRS-IS");
                    true
                }
                Err(err) => {
                    tracing::error!(error = %err, "APRS-IS send failed");
                    false
                }
            }
        }
    }
}
