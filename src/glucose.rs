//! Recent glucose readings, kept in sync with the backend.
//!
//! Failures here are logged and swallowed: a history that cannot be loaded
//! leaves the previous one on screen, and a reading that cannot be saved is
//! simply not added. This is deliberately softer than prediction
//! submissions, which always surface their errors.

use chrono::{DateTime, Utc};

use crate::auth::TokenSource;
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::models::{GlucoseBand, GlucoseReading};

/// Days of history fetched on each load.
pub const DEFAULT_FETCH_DAYS: u32 = 7;
/// Rows shown in the recent-readings list.
pub const DEFAULT_DISPLAY_LIMIT: usize = 5;

/// One row of the recent-readings list.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingView<'a> {
    pub value: f64,
    pub band: GlucoseBand,
    pub timestamp: DateTime<Utc>,
    pub notes: Option<&'a str>,
}

impl ReadingView<'_> {
    pub fn value_label(&self) -> String {
        format!("{} mg/dL", self.value)
    }
}

#[derive(Debug, Clone)]
pub struct GlucoseHistoryService {
    history: Vec<GlucoseReading>,
    fetch_days: u32,
    display_limit: usize,
}

impl Default for GlucoseHistoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl GlucoseHistoryService {
    pub fn new() -> Self {
        Self::with_windows(DEFAULT_FETCH_DAYS, DEFAULT_DISPLAY_LIMIT)
    }

    /// Fetch window and display window are independent.
    pub fn with_windows(fetch_days: u32, display_limit: usize) -> Self {
        Self {
            history: Vec::new(),
            fetch_days,
            display_limit,
        }
    }

    pub fn history(&self) -> &[GlucoseReading] {
        &self.history
    }

    pub fn fetch_days(&self) -> u32 {
        self.fetch_days
    }

    /// Replace the held history with the server's. Returns whether the load
    /// succeeded; on failure the previous history is kept.
    pub async fn load_history<T>(&mut self, tokens: &T, client: &ApiClient) -> bool
    where
        T: TokenSource + ?Sized,
    {
        match self.fetch(tokens, client).await {
            Ok(readings) => {
                tracing::debug!("Loaded {} glucose reading(s)", readings.len());
                self.history = readings;
                true
            }
            Err(e) => {
                tracing::error!("Error loading glucose history: {}", e);
                false
            }
        }
    }

    async fn fetch<T>(
        &self,
        tokens: &T,
        client: &ApiClient,
    ) -> Result<Vec<GlucoseReading>, ApiError>
    where
        T: TokenSource + ?Sized,
    {
        let credential = tokens
            .access_token()
            .await
            .map_err(|e| ApiError::Auth(e.to_string()))?;
        client.get_glucose_history(&credential, self.fetch_days).await
    }

    /// Store a reading taken now, then reload the history from the server.
    ///
    /// Returns true once the server accepted the reading, so the caller can
    /// clear its input form; a failed reload afterwards does not change that.
    pub async fn add_reading<T>(
        &mut self,
        tokens: &T,
        client: &ApiClient,
        value: f64,
        notes: Option<String>,
    ) -> bool
    where
        T: TokenSource + ?Sized,
    {
        match Self::store(tokens, client, value, notes).await {
            Ok(_) => {
                self.load_history(tokens, client).await;
                true
            }
            Err(e) => {
                tracing::error!("Error adding glucose reading: {}", e);
                false
            }
        }
    }

    async fn store<T>(
        tokens: &T,
        client: &ApiClient,
        value: f64,
        notes: Option<String>,
    ) -> Result<serde_json::Value, ApiError>
    where
        T: TokenSource + ?Sized,
    {
        let reading = GlucoseReading::new(value, Utc::now(), notes)?;
        let credential = tokens
            .access_token()
            .await
            .map_err(|e| ApiError::Auth(e.to_string()))?;
        client.add_glucose_reading(&credential, &reading).await
    }

    /// Most recent readings first, at most `display_limit` of them.
    pub fn recent_readings(&self) -> Vec<ReadingView<'_>> {
        let mut readings: Vec<&GlucoseReading> = self.history.iter().collect();
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        readings
            .into_iter()
            .take(self.display_limit)
            .map(|r| ReadingView {
                value: r.value,
                band: r.band(),
                timestamp: r.timestamp,
                notes: r.notes.as_deref(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reading(value: f64, minutes_ago: i64) -> GlucoseReading {
        GlucoseReading::new(value, Utc::now() - Duration::minutes(minutes_ago), None).unwrap()
    }

    #[test]
    fn recent_readings_are_newest_first_and_truncated() {
        let mut service = GlucoseHistoryService::new();
        service.history = (0..8).map(|i| reading(80.0 + i as f64, 60 * (8 - i))).collect();

        let rows = service.recent_readings();
        assert_eq!(rows.len(), DEFAULT_DISPLAY_LIMIT);
        assert_eq!(rows[0].value, 87.0);
        assert!(rows.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn rows_carry_band_and_label() {
        let mut service = GlucoseHistoryService::with_windows(30, 2);
        service.history = vec![reading(150.0, 5), reading(65.0, 10), reading(95.0, 20)];

        let rows = service.recent_readings();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].band, GlucoseBand::High);
        assert_eq!(rows[1].band, GlucoseBand::Low);
        assert_eq!(rows[0].value_label(), "150 mg/dL");
        assert_eq!(service.fetch_days(), 30);
    }
}
