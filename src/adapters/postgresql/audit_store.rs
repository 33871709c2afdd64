//! Read-only audit queries
//!
//! Table and column names are interpolated from the entity registry only.

use crate::adapters::database::traits::{AuditStore, OrphanStats};
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::domain::{EntitySpec, ReferenceRule, Result, TallyError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

fn key_list(spec: &EntitySpec) -> String {
    spec.key_columns
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn count_in_window_sql(spec: &EntitySpec) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE {ts} >= $1 AND {ts} <= $2",
        spec.table,
        ts = spec.timestamp_column
    )
}

pub fn null_keys_sql(spec: &EntitySpec) -> String {
    let any_null = spec
        .key_columns
        .iter()
        .map(|c| format!("{} IS NULL", c.name))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!(
        "SELECT COUNT(*) FROM {} WHERE {ts} >= $1 AND {ts} <= $2 AND ({any_null})",
        spec.table,
        ts = spec.timestamp_column
    )
}

pub fn duplicate_keys_sql(spec: &EntitySpec) -> String {
    let keys = key_list(spec);
    format!(
        "SELECT COUNT(*) FROM (SELECT {keys} FROM {} WHERE {ts} >= $1 AND {ts} <= $2 \
         GROUP BY {keys} HAVING COUNT(*) > 1) dup",
        spec.table,
        ts = spec.timestamp_column
    )
}

fn orphan_predicate(rule: &ReferenceRule) -> String {
    let child = rule.child.spec();
    let parent = rule.parent.spec();
    format!(
        "FROM {ct} c WHERE c.{cc} IS NOT NULL AND c.{ts} >= $1 AND c.{ts} <= $2",
        ct = child.table,
        cc = rule.child_column,
        ts = child.timestamp_column,
    ) + &format!(
        " AND NOT EXISTS (SELECT 1 FROM {pt} p WHERE p.{pc} = c.{cc})",
        pt = parent.table,
        pc = rule.parent_column,
        cc = rule.child_column,
    )
}

pub fn orphan_stats_sql(rule: &ReferenceRule) -> String {
    let child = rule.child.spec();
    let parent = rule.parent.spec();
    format!(
        "SELECT \
         COUNT(*) FILTER (WHERE NOT EXISTS (SELECT 1 FROM {pt} p WHERE p.{pc} = c.{cc})) AS orphans, \
         COUNT(*) AS total \
         FROM {ct} c WHERE c.{cc} IS NOT NULL AND c.{ts} >= $1 AND c.{ts} <= $2",
        pt = parent.table,
        pc = rule.parent_column,
        cc = rule.child_column,
        ct = child.table,
        ts = child.timestamp_column,
    )
}

pub fn orphan_sample_sql(rule: &ReferenceRule) -> String {
    format!(
        "SELECT s.fk::text AS fk FROM (SELECT DISTINCT c.{cc} AS fk {pred} ORDER BY c.{cc} LIMIT $3) s ORDER BY s.fk",
        cc = rule.child_column,
        pred = orphan_predicate(rule),
    )
}

pub struct PostgreSQLAuditStore {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAuditStore {
    pub fn new(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    fn id_column(spec: &EntitySpec) -> Result<&'static str> {
        spec.integer_id_column().ok_or_else(|| {
            TallyError::Validation(format!("{} has no single integer id column", spec.kind))
        })
    }
}

#[async_trait]
impl AuditStore for PostgreSQLAuditStore {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let rows = self
            .client
            .query(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name::text = $1)",
                &[&table],
            )
            .await?;
        Ok(rows.first().map(|r| r.get::<_, bool>(0)).unwrap_or(false))
    }

    async fn missing_columns(&self, spec: &'static EntitySpec) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT column_name::text FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name::text = $1",
                &[&spec.table],
            )
            .await?;
        let present: HashSet<String> = rows
            .iter()
            .map(|r| r.get::<_, String>(0).to_lowercase())
            .collect();

        Ok(spec
            .required_columns
            .iter()
            .filter(|c| !present.contains(**c))
            .map(|c| c.to_string())
            .collect())
    }

    async fn count_in_window(
        &self,
        spec: &'static EntitySpec,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        self.client
            .query_i64(&count_in_window_sql(spec), &[&start, &end])
            .await
    }

    async fn count_null_keys(
        &self,
        spec: &'static EntitySpec,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        self.client
            .query_i64(&null_keys_sql(spec), &[&start, &end])
            .await
    }

    async fn count_duplicate_keys(
        &self,
        spec: &'static EntitySpec,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        self.client
            .query_i64(&duplicate_keys_sql(spec), &[&start, &end])
            .await
    }

    async fn orphan_stats(
        &self,
        rule: &'static ReferenceRule,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<OrphanStats> {
        let rows = self
            .client
            .query(&orphan_stats_sql(rule), &[&start, &end])
            .await?;
        let Some(row) = rows.first() else {
            return Ok(OrphanStats::default());
        };
        Ok(OrphanStats {
            orphans: row.get("orphans"),
            children_with_fk: row.get("total"),
        })
    }

    async fn orphan_sample(
        &self,
        rule: &'static ReferenceRule,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(&orphan_sample_sql(rule), &[&start, &end, &limit])
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>("fk")).collect())
    }

    async fn ids_sequential(
        &self,
        spec: &'static EntitySpec,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool> {
        let id = Self::id_column(spec)?;
        let query = format!(
            "SELECT COUNT(DISTINCT {id}), MIN({id}), MAX({id}) FROM {} \
             WHERE {ts} >= $1 AND {ts} < $2",
            spec.table,
            ts = spec.timestamp_column
        );
        let rows = self.client.query(&query, &[&since, &until]).await?;
        let Some(row) = rows.first() else {
            return Ok(false);
        };

        let count: i64 = row.get(0);
        let min: Option<i64> = row.get(1);
        let max: Option<i64> = row.get(2);
        Ok(match (min, max) {
            (Some(min), Some(max)) if count > 0 => max - min + 1 == count,
            _ => false,
        })
    }

    async fn count_id_gaps(&self, spec: &'static EntitySpec, since: DateTime<Utc>) -> Result<i64> {
        let id = Self::id_column(spec)?;
        let query = format!(
            "SELECT COALESCE(MAX({id}) - MIN({id}) + 1 - COUNT(DISTINCT {id}), 0) FROM {} \
             WHERE {ts} >= $1",
            spec.table,
            ts = spec.timestamp_column
        );
        self.client.query_i64(&query, &[&since]).await
    }
}
