//! Pointer-paginated REST source
//!
//! The first request carries `since=<window start>`; every following request
//! carries `start=<next_id>` taken from the previous response's `paging` block.

use super::{records_from, PointerPage, PointerSource};
use crate::adapters::http::ApiClient;
use crate::domain::{ApiError, EntitySpec, ExtractionWindow};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct RestSource {
    client: ApiClient,
}

impl RestSource {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

fn next_marker(body: &Value) -> Option<String> {
    match body.get("paging")?.get("next_id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl PointerSource for RestSource {
    async fn fetch_page(
        &self,
        spec: &'static EntitySpec,
        window: &ExtractionWindow,
        marker: Option<&str>,
        page_size: usize,
    ) -> Result<PointerPage, ApiError> {
        let mut query = Vec::with_capacity(2);
        match marker {
            Some(start) => query.push(("start", start.to_string())),
            None => query.push(("since", window.start_ts().to_rfc3339())),
        }
        query.push(("per", page_size.to_string()));

        let label = format!("rest:{}", spec.kind);
        let body = self.client.get_json(&label, spec.source, &query).await?;
        let next_marker = next_marker(&body);
        let records = records_from(body)?;

        Ok(PointerPage {
            records,
            next_marker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::RateLimitedChannel;
    use crate::config::{secret_string, ApiConfig, RateLimitConfig};
    use crate::domain::EntityKind;
    use chrono::NaiveDate;
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::Arc;

    fn source(url: &str) -> RestSource {
        let config = ApiConfig {
            base_url: url.to_string(),
            token: secret_string("t".to_string()),
            timeout_seconds: 5,
            tls_verify: true,
            rate_limit: RateLimitConfig {
                min_interval_ms: 0,
                max_retries: 0,
                ..RateLimitConfig::default()
            },
        };
        let channel = Arc::new(RateLimitedChannel::new(config.rate_limit.clone()));
        RestSource::new(ApiClient::new(&config, channel).unwrap())
    }

    #[test]
    fn test_next_marker_variants() {
        assert_eq!(next_marker(&json!({"paging": {"next_id": 42}})).as_deref(), Some("42"));
        assert_eq!(next_marker(&json!({"paging": {"next_id": "a1"}})).as_deref(), Some("a1"));
        assert_eq!(next_marker(&json!({"paging": {"next_id": null}})), None);
        assert_eq!(next_marker(&json!({"data": []})), None);
    }

    #[tokio::test]
    async fn test_first_page_uses_since_then_start() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/api/invoice_occurrences")
            .match_query(Matcher::AllOf(vec![
                Matcher::Regex("since=".into()),
                Matcher::UrlEncoded("per".into(), "100".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data":[{"id":1},{"id":2}],"paging":{"next_id":3}}"#)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/api/invoice_occurrences")
            .match_query(Matcher::UrlEncoded("start".into(), "3".into()))
            .with_status(200)
            .with_body(r#"{"data":[],"paging":{"next_id":null}}"#)
            .create_async()
            .await;

        let source = source(&server.url());
        let window = ExtractionWindow::for_day(
            EntityKind::Occurrences,
            NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(),
        );
        let spec = EntityKind::Occurrences.spec();

        let page = source.fetch_page(spec, &window, None, 100).await.unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.next_marker.as_deref(), Some("3"));

        let page = source.fetch_page(spec, &window, Some("3"), 100).await.unwrap();
        assert!(page.records.is_empty());
        assert!(page.next_marker.is_none());

        first.assert_async().await;
        second.assert_async().await;
    }
}
