use crate::config::InfluxConfig;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// One result row: a single field reading with its sample time. Rows whose
/// `_time` cell is empty or unparsable carry `time: None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub field: String,
    pub value: f64,
    pub time: Option<DateTime<Utc>>,
}

pub struct InfluxReader {
    http: Client,
    url: String,
    token: Option<String>,
    org: Option<String>,
    bucket: String,
    measurement: String,
    station: String,
}

impl InfluxReader {
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()
            .context("failed to build influxdb http client")?;
        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            org: config.org.clone(),
            // 1.x-compat bucket naming: database/retention-policy.
            bucket: format!("{}/{}", config.db, config.rp),
            measurement: config.measurement.clone(),
            station: config.station.clone(),
        })
    }

    fn flux_query(&self, lookback: Duration) -> String {
        format!(
            r#"from(bucket: "{bucket}")
  |> range(start: -{lookback}s)
  |> filter(fn: (r) => r._measurement == "{measurement}" and r.id == "{station}")
  |> limit(n:1)"#,
            bucket = self.bucket,
            lookback = lookback.as_secs(),
            measurement = self.measurement,
            station = self.station,
        )
    }

    /// Issues the one query a cycle is allowed: the latest row per series
    /// inside the lookback window. The result is a one-pass sample stream.
    pub async fn query_latest(&self, lookback: Duration) -> Result<SampleStream> {
        let mut request = self
            .http
            .post(format!("{}/api/v2/query", self.url))
            .header("Accept", "application/csv")
            .header("Content-Type", "application/vnd.flux")
            .body(self.flux_query(lookback));
        if let Some(org) = &self.org {
            request = request.query(&[("org", org.as_str())]);
        }
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Token {token}"));
        }

        let response = request.send().await.context("influxdb query failed")?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read influxdb response")?;
        if !status.is_success() {
            bail!(
                "influxdb query returned {}: {}",
                status,
                body.lines().next().unwrap_or_default()
            );
        }
        Ok(SampleStream::new(body))
    }
}

/// Lazy one-pass iterator over an annotated-CSV query response. Annotation
/// rows (`#...`) and blank table separators are skipped; header rows
/// re-index the `_field` / `_value` / `_time` columns, so multi-table
/// responses with differing schemas parse correctly.
pub struct SampleStream {
    body: String,
    pos: usize,
    field_col: Option<usize>,
    value_col: Option<usize>,
    time_col: Option<usize>,
}

impl SampleStream {
    pub fn new(body: String) -> Self {
        Self {
            body,
            pos: 0,
            field_col: None,
            value_col: None,
            time_col: None,
        }
    }
}

impl Iterator for SampleStream {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        while self.pos < self.body.len() {
            let start = self.pos;
            let rest = &self.body[start..];
            let (line_end, next) = match rest.find('\n') {
                Some(i) => (start + i, start + i + 1),
                None => (self.body.len(), self.body.len()),
            };
            self.pos = next;

            let line = self.body[start..line_end].trim_end_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let cells: Vec<&str> = line.split(',').collect();
            let field_col = cells.iter().position(|c| *c == "_field");
            let value_col = cells.iter().position(|c| *c == "_value");
            if let (Some(field), Some(value)) = (field_col, value_col) {
                self.field_col = Some(field);
                self.value_col = Some(value);
                self.time_col = cells.iter().position(|c| *c == "_time");
                continue;
            }

            let (Some(field_col), Some(value_col)) = (self.field_col, self.value_col) else {
                continue;
            };
            let Some(field) = cells.get(field_col).filter(|c| !c.is_empty()) else {
                continue;
            };
            let Some(value) = cells.get(value_col).and_then(|c| c.parse::<f64>().ok()) else {
                continue;
            };
            let time = self
                .time_col
                .and_then(|col| cells.get(col))
                .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
                .map(|dt| dt.with_timezone(&Utc));

            return Some(Sample {
                field: field.to_string(),
                value,
                time,
            });
        }
        None
    }
}
