//! Forex calendar feed client
//!
//! Proxies a public JSON feed of upcoming economic events. The shared HTTP
//! client carries a fixed timeout; a slow feed fails the request instead of
//! hanging it.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// One calendar entry as published by the feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub title: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub forecast: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
}

/// Keep events matching the optional currency/impact filters
pub fn filter_events(
    events: Vec<CalendarEvent>,
    currency: Option<&str>,
    impact: Option<&str>,
) -> Vec<CalendarEvent> {
    events
        .into_iter()
        .filter(|e| match currency {
            Some(c) => e
                .country
                .as_deref()
                .is_some_and(|country| country.eq_ignore_ascii_case(c)),
            None => true,
        })
        .filter(|e| match impact {
            Some(i) => e
                .impact
                .as_deref()
                .is_some_and(|imp| imp.eq_ignore_ascii_case(i)),
            None => true,
        })
        .collect()
}

/// Calendar feed client
#[derive(Clone)]
pub struct CalendarClient {
    http: reqwest::Client,
    feed_url: String,
}

impl CalendarClient {
    pub fn new(http: reqwest::Client, feed_url: String) -> Self {
        Self { http, feed_url }
    }

    pub async fn fetch(&self) -> ApiResult<Vec<CalendarEvent>> {
        let events: Vec<CalendarEvent> = self
            .http
            .get(&self.feed_url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ApiError::Upstream(format!("calendar feed error: {}", e)))?
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("calendar feed parse error: {}", e)))?;

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(country: &str, impact: &str) -> CalendarEvent {
        CalendarEvent {
            title: "Nonfarm Payrolls".to_string(),
            country: Some(country.to_string()),
            date: None,
            impact: Some(impact.to_string()),
            forecast: None,
            previous: None,
        }
    }

    #[test]
    fn filters_by_currency_case_insensitively() {
        let events = vec![event("USD", "High"), event("EUR", "High")];
        let filtered = filter_events(events, Some("usd"), None);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].country.as_deref(), Some("USD"));
    }

    #[test]
    fn filters_by_impact() {
        let events = vec![event("USD", "High"), event("USD", "Low")];
        let filtered = filter_events(events, None, Some("high"));
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn no_filters_keeps_everything() {
        let events = vec![event("USD", "High"), event("EUR", "Low")];
        assert_eq!(filter_events(events, None, None).len(), 2);
    }

    #[tokio::test]
    async fn fetch_parses_feed_json() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/feed.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"title": "CPI y/y", "country": "USD", "impact": "High"}]"#,
            )
            .create_async()
            .await;

        let client = CalendarClient::new(
            reqwest::Client::new(),
            format!("{}/feed.json", server.url()),
        );
        let events = client.fetch().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "CPI y/y");
    }
}
