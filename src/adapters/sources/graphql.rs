//! Cursor-paginated GraphQL source

use super::{json_kind, CursorPage, CursorSource, LookupSource};
use crate::adapters::http::ApiClient;
use crate::domain::{ApiError, EntityKind, EntitySpec, ExtractionWindow, RecordKey};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Field selection and date filter of one GraphQL root
struct Selection {
    fields: &'static str,
    date_field: &'static str,
}

fn selection(kind: EntityKind) -> Selection {
    match kind {
        EntityKind::Invoices => Selection {
            fields: "id document issueDate dueDate value paidValue nfseNumber bankAccountId paymentMethod",
            date_field: "issueDate",
        },
        EntityKind::Freights => Selection {
            fields: "id serviceAt accountingCreditId total status",
            date_field: "serviceAt",
        },
        EntityKind::Pickups => Selection {
            fields: "id sequenceCode requestDate status",
            date_field: "requestDate",
        },
        EntityKind::Users => Selection {
            fields: "id name email updatedAt",
            date_field: "updatedAt",
        },
        // Not served by GraphQL; requesting the id keeps the query well formed
        _ => Selection {
            fields: "id",
            date_field: "createdAt",
        },
    }
}

/// GraphQL endpoint serving cursor listings and per-record lookups
#[derive(Debug, Clone)]
pub struct GraphQlSource {
    client: ApiClient,
    path: String,
}

impl GraphQlSource {
    pub fn new(client: ApiClient) -> Self {
        Self::with_path(client, "graphql")
    }

    pub fn with_path(client: ApiClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    fn page_query(spec: &EntitySpec) -> String {
        let sel = selection(spec.kind);
        format!(
            "query Page($params: JSON, $after: String, $first: Int) {{ {root}(params: $params, after: $after, first: $first) {{ edges {{ node {{ {fields} }} }} pageInfo {{ hasNextPage endCursor }} }} }}",
            root = spec.source,
            fields = sel.fields
        )
    }

    async fn post(&self, label: &str, body: Value, root: &str) -> Result<Value, ApiError> {
        let mut response = self.client.post_json(label, &self.path, &body).await?;

        if let Some(errors) = response.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ApiError::InvalidResponse(format!("GraphQL errors: {message}")));
            }
        }

        response
            .get_mut("data")
            .and_then(|d| d.get_mut(root))
            .map(Value::take)
            .ok_or_else(|| ApiError::InvalidResponse(format!("Missing data.{root} in response")))
    }
}

fn nodes(connection: &mut Value) -> Result<Vec<Value>, ApiError> {
    match connection.get_mut("edges").map(Value::take) {
        Some(Value::Array(edges)) => Ok(edges
            .into_iter()
            .filter_map(|mut edge| match edge.get_mut("node").map(Value::take) {
                Some(Value::Null) | None => None,
                Some(node) => Some(node),
            })
            .collect()),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(ApiError::InvalidResponse(format!(
            "Expected edges array, got {}",
            json_kind(&other)
        ))),
    }
}

#[async_trait]
impl CursorSource for GraphQlSource {
    async fn fetch_page(
        &self,
        spec: &'static EntitySpec,
        window: &ExtractionWindow,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<CursorPage, ApiError> {
        let sel = selection(spec.kind);
        let range = format!("{} - {}", window.start(), window.end());
        let body = json!({
            "query": Self::page_query(spec),
            "variables": {
                "params": { sel.date_field: range },
                "after": cursor,
                "first": page_size,
            }
        });

        let label = format!("graphql:{}", spec.kind);
        let mut connection = self.post(&label, body, spec.source).await?;
        let records = nodes(&mut connection)?;

        let page_info = connection.get("pageInfo");
        let has_next_page = page_info
            .and_then(|p| p.get("hasNextPage"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let end_cursor = page_info
            .and_then(|p| p.get("endCursor"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(CursorPage {
            records,
            end_cursor,
            has_next_page,
        })
    }
}

#[async_trait]
impl LookupSource for GraphQlSource {
    async fn lookup(
        &self,
        spec: &'static EntitySpec,
        key: &RecordKey,
    ) -> Result<Option<Value>, ApiError> {
        let sel = selection(spec.kind);
        let body = json!({
            "query": format!(
                "query Lookup($params: JSON) {{ {root}(params: $params, first: 1) {{ edges {{ node {{ {fields} }} }} }} }}",
                root = spec.source,
                fields = sel.fields
            ),
            "variables": { "params": { "id": key.as_str() } }
        });

        let label = format!("graphql-lookup:{}", spec.kind);
        let mut connection = self.post(&label, body, spec.source).await?;
        Ok(nodes(&mut connection)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::RateLimitedChannel;
    use crate::config::{secret_string, ApiConfig, RateLimitConfig};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn source(url: &str) -> GraphQlSource {
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
        GraphQlSource::new(ApiClient::new(&config, channel).unwrap())
    }

    fn window() -> ExtractionWindow {
        let day = NaiveDate::from_ymd_opt(2025, 5, 10).unwrap();
        ExtractionWindow::for_day(EntityKind::Freights, day)
    }

    #[tokio::test]
    async fn test_fetch_page_parses_connection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/graphql")
            .with_status(200)
            .with_body(
                r#"{"data":{"freight":{"edges":[{"node":{"id":1}},{"node":{"id":2}}],
                   "pageInfo":{"hasNextPage":true,"endCursor":"abc"}}}}"#,
            )
            .create_async()
            .await;

        let page = source(&server.url())
            .fetch_page(EntityKind::Freights.spec(), &window(), None, 100)
            .await
            .unwrap();

        assert_eq!(page.records.len(), 2);
        assert!(page.has_next_page);
        assert_eq!(page.end_cursor.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_graphql_errors_are_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/graphql")
            .with_status(200)
            .with_body(r#"{"errors":[{"message":"field not found"}]}"#)
            .create_async()
            .await;

        let result = source(&server.url())
            .fetch_page(EntityKind::Freights.spec(), &window(), Some("c1"), 100)
            .await;

        match result {
            Err(ApiError::InvalidResponse(msg)) => assert!(msg.contains("field not found")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lookup_returns_first_node() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/graphql")
            .with_status(200)
            .with_body(r#"{"data":{"creditCustomerBilling":{"edges":[{"node":{"id":9,"nfseNumber":"123"}}]}}}"#)
            .create_async()
            .await;

        let key = RecordKey::new("9").unwrap();
        let found = source(&server.url())
            .lookup(EntityKind::Invoices.spec(), &key)
            .await
            .unwrap();
        assert_eq!(found.unwrap()["nfseNumber"], "123");
    }
}
