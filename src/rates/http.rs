//! HTTP rate provider.
//!
//! Three monthly endpoints share one response convention: a JSON object with
//! the close series under a kind-specific field, keyed by ISO date, plus an
//! optional `Note` field the API uses to signal throttling. Throttling is
//! detected by a trailing-substring match on that note.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use tracing::{debug, error};

use crate::model::{ExchangeRate, SyncKind};
use crate::rates::{FetchOutcome, RateProvider};

const RATE_LIMIT_SUFFIX: &str = "calls per minute and 500 calls per day.";

fn series_field(kind: SyncKind) -> &'static str {
    match kind {
        SyncKind::Currency => "Time Series FX (Monthly)",
        SyncKind::Crypto => "Time Series (Digital Currency Monthly)",
        SyncKind::Stock => "Monthly Adjusted Time Series",
    }
}

fn close_field(kind: SyncKind) -> &'static str {
    match kind {
        SyncKind::Currency => "4. close",
        SyncKind::Crypto => "4a. close (USD)",
        SyncKind::Stock => "5. adjusted close",
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct HttpRateProvider {
    base_url: String,
}

impl HttpRateProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
        }
    }

    fn endpoint(&self, kind: SyncKind, ticker: &str, token: &str) -> String {
        match kind {
            SyncKind::Currency => format!(
                "{}/query?function=FX_MONTHLY&from_symbol={}&to_symbol=USD&apikey={}",
                self.base_url, ticker, token
            ),
            SyncKind::Crypto => format!(
                "{}/query?function=DIGITAL_CURRENCY_MONTHLY&symbol={}&market=USD&apikey={}",
                self.base_url, ticker, token
            ),
            SyncKind::Stock => format!(
                "{}/query?function=TIME_SERIES_MONTHLY_ADJUSTED&symbol={}&apikey={}",
                self.base_url, ticker, token
            ),
        }
    }
}

fn parse_series(body: &Value, kind: SyncKind, ticker: &str) -> Result<Vec<ExchangeRate>> {
    let series = body
        .get(series_field(kind))
        .and_then(|v| v.as_object())
        .ok_or_else(|| anyhow!("No {} series found for ticker: {}", kind, ticker))?;

    let mut rates = Vec::with_capacity(series.len());
    for (date_str, fields) in series {
        let close = fields
            .get(close_field(kind))
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Missing close price for {} on {}", ticker, date_str))?;
        let value: f64 = close
            .parse()
            .with_context(|| format!("Invalid close price for {} on {}", ticker, date_str))?;
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .with_context(|| format!("Invalid series date: {date_str}"))?;
        // Series keys are end-of-month trading days; normalize to the first.
        let month = date.with_day(1).unwrap_or(date);
        rates.push(ExchangeRate {
            month,
            value: round2(value),
        });
    }
    rates.sort_by_key(|r| r.month);
    Ok(rates)
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn fetch_monthly(
        &self,
        kind: SyncKind,
        ticker: &str,
        token: &str,
    ) -> Result<FetchOutcome> {
        let url = self.endpoint(kind, ticker, token);
        debug!("Requesting monthly rates from {}", url);

        let client = reqwest::Client::builder()
            .user_agent("finwatch/0.1")
            .build()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for ticker: {} URL: {}", e, ticker, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for ticker: {}",
                response.status(),
                ticker
            ));
        }

        let text = response.text().await?;
        let body: Value = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(e) => {
                error!(
                    error = ?e,
                    response = %text,
                    "Failed to parse rates response"
                );
                return Err(e).context("Failed to parse rates response");
            }
        };

        if let Some(note) = body.get("Note").and_then(|n| n.as_str()) {
            if note.trim_end().ends_with(RATE_LIMIT_SUFFIX) {
                debug!(ticker, "Provider rate limited");
                return Ok(FetchOutcome::RateLimited);
            }
        }

        Ok(FetchOutcome::Series(parse_series(&body, kind, ticker)?))
    }
}
