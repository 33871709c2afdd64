//! Entity kinds and their compile-time registry
//!
//! Every table name, key column and timestamp column used to build SQL comes from
//! the constants in this module, never from external input.

use super::ids::RecordKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One logical record type extracted and persisted by Tally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Invoices,
    Freights,
    Pickups,
    Users,
    Occurrences,
    Manifests,
    Quotes,
    CargoLocations,
    Payables,
    CustomerInvoices,
}

impl EntityKind {
    /// All kinds in extraction order (parents before children)
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Users,
        EntityKind::Invoices,
        EntityKind::Freights,
        EntityKind::Pickups,
        EntityKind::Manifests,
        EntityKind::Quotes,
        EntityKind::CargoLocations,
        EntityKind::Payables,
        EntityKind::CustomerInvoices,
        EntityKind::Occurrences,
    ];

    /// Canonical name, as written to the extraction log
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Invoices => "invoices",
            EntityKind::Freights => "freights",
            EntityKind::Pickups => "pickups",
            EntityKind::Users => "users",
            EntityKind::Occurrences => "occurrences",
            EntityKind::Manifests => "manifests",
            EntityKind::Quotes => "quotes",
            EntityKind::CargoLocations => "cargo_locations",
            EntityKind::Payables => "payables",
            EntityKind::CustomerInvoices => "customer_invoices",
        }
    }

    /// Registry entry for this kind
    pub fn spec(&self) -> &'static EntitySpec {
        match self {
            EntityKind::Invoices => &INVOICES,
            EntityKind::Freights => &FREIGHTS,
            EntityKind::Pickups => &PICKUPS,
            EntityKind::Users => &USERS,
            EntityKind::Occurrences => &OCCURRENCES,
            EntityKind::Manifests => &MANIFESTS,
            EntityKind::Quotes => &QUOTES,
            EntityKind::CargoLocations => &CARGO_LOCATIONS,
            EntityKind::Payables => &PAYABLES,
            EntityKind::CustomerInvoices => &CUSTOMER_INVOICES,
        }
    }

    /// Parses a comma-separated list, rejecting unknown names
    pub fn parse_list(input: &str) -> Result<Vec<EntityKind>, String> {
        let mut kinds = Vec::new();
        for name in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let kind = EntityKind::from_str(name)?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        let kind = match normalized.as_str() {
            "invoices" | "invoice" | "faturas" | "faturas_graphql" => EntityKind::Invoices,
            "freights" | "freight" | "fretes" => EntityKind::Freights,
            "pickups" | "pickup" | "coletas" => EntityKind::Pickups,
            "users" | "user" | "usuarios_sistema" => EntityKind::Users,
            "occurrences" | "occurrence" | "ocorrencias" => EntityKind::Occurrences,
            "manifests" | "manifest" | "manifestos" => EntityKind::Manifests,
            "quotes" | "quote" | "cotacoes" | "cotacao" => EntityKind::Quotes,
            "cargo_locations" | "cargo_location" | "localizacao_cargas" | "localizacao_carga" => {
                EntityKind::CargoLocations
            }
            "payables" | "accounts_payable" | "contas_a_pagar" => EntityKind::Payables,
            "customer_invoices" | "invoices_by_customer" | "faturas_por_cliente" => {
                EntityKind::CustomerInvoices
            }
            _ => return Err(format!("Unknown entity kind '{s}'")),
        };
        Ok(kind)
    }
}

/// How an entity's remote listing is paged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMode {
    /// Opaque continuation token
    Cursor,
    /// `start=<lastSeenId>` marker
    Pointer,
    /// Single synchronous range query
    Bulk,
}

/// SQL type of a projected column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    BigInt,
}

/// A column projected out of the JSON payload
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    /// Column name in the entity table
    pub name: &'static str,
    /// Top-level payload field the value is read from
    pub field: &'static str,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    const fn text(name: &'static str, field: &'static str) -> Self {
        Self {
            name,
            field,
            column_type: ColumnType::Text,
        }
    }

    const fn bigint(name: &'static str, field: &'static str) -> Self {
        Self {
            name,
            field,
            column_type: ColumnType::BigInt,
        }
    }

    /// Reads this column's value from a payload as text.
    ///
    /// `BigInt` columns are rendered in canonical integer form, so `1`, `"01"`
    /// and `"+1"` read the same and unparseable values yield `None`. Nulls,
    /// blanks and nested values yield `None`.
    pub fn read(&self, payload: &Value) -> Option<String> {
        if self.column_type == ColumnType::BigInt {
            return self.read_i64(payload).map(|n| n.to_string());
        }
        match payload.get(self.field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Reads this column as an integer, for `BigInt` columns
    pub fn read_i64(&self, payload: &Value) -> Option<i64> {
        match payload.get(self.field)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Registry entry describing how an entity is fetched, stored and audited
#[derive(Debug)]
pub struct EntitySpec {
    pub kind: EntityKind,
    /// Destination table
    pub table: &'static str,
    /// Column stamped at persistence time and used for window counts
    pub timestamp_column: &'static str,
    /// Natural key, in order
    pub key_columns: &'static [ColumnSpec],
    /// Additional projected columns (foreign keys, display fields)
    pub extra_columns: &'static [ColumnSpec],
    /// Columns the audit requires to exist
    pub required_columns: &'static [&'static str],
    pub pagination: PaginationMode,
    /// Fields filled by a secondary per-record lookup when the listing omits them
    pub enrichment_fields: &'static [&'static str],
    /// IDs are contiguous integers worth probing for gaps
    pub gap_probe: bool,
    /// Remote source: query root, endpoint path or report template
    pub source: &'static str,
}

impl EntitySpec {
    /// Extracts the natural key from a payload, `None` when any part is missing
    pub fn natural_key(&self, payload: &Value) -> Option<RecordKey> {
        let parts: Option<Vec<String>> = self.key_columns.iter().map(|c| c.read(payload)).collect();
        RecordKey::from_parts(parts?).ok()
    }

    /// Key and extra columns, in insert order
    pub fn projected_columns(&self) -> impl Iterator<Item = &'static ColumnSpec> {
        self.key_columns.iter().chain(self.extra_columns.iter())
    }

    /// Whether listing results go through the enrichment pipeline
    pub fn is_enriched(&self) -> bool {
        !self.enrichment_fields.is_empty()
    }

    /// Name of the single integer key column, if the key has that shape
    pub fn integer_id_column(&self) -> Option<&'static str> {
        match self.key_columns {
            [only] if only.column_type == ColumnType::BigInt => Some(only.name),
            _ => None,
        }
    }
}

/// Cross-entity foreign key checked by the audit
#[derive(Debug)]
pub struct ReferenceRule {
    /// Short name used in finding codes
    pub name: &'static str,
    pub child: EntityKind,
    pub child_column: &'static str,
    pub parent: EntityKind,
    pub parent_column: &'static str,
    /// Whether orphans are compared against the configured tolerance.
    /// Rules without tolerance fail on any orphan.
    pub tolerant: bool,
}

/// Every cross-entity reference the audit knows about
pub const REFERENCE_RULES: &[ReferenceRule] = &[
    ReferenceRule {
        name: "MANIFESTOS",
        child: EntityKind::Manifests,
        child_column: "pick_sequence_code",
        parent: EntityKind::Pickups,
        parent_column: "sequence_code",
        tolerant: true,
    },
    ReferenceRule {
        name: "FRETES",
        child: EntityKind::Freights,
        child_column: "invoice_id",
        parent: EntityKind::Invoices,
        parent_column: "id",
        tolerant: false,
    },
];

const STANDARD_TS: &str = "extracted_at";

static INVOICES: EntitySpec = EntitySpec {
    kind: EntityKind::Invoices,
    table: "invoices",
    timestamp_column: STANDARD_TS,
    key_columns: &[ColumnSpec::bigint("id", "id")],
    extra_columns: &[ColumnSpec::text("document", "document")],
    required_columns: &["id", "metadata", "extracted_at"],
    pagination: PaginationMode::Cursor,
    enrichment_fields: &["nfseNumber", "bankAccountId", "paymentMethod"],
    gap_probe: false,
    source: "creditCustomerBilling",
};

static FREIGHTS: EntitySpec = EntitySpec {
    kind: EntityKind::Freights,
    table: "freights",
    timestamp_column: STANDARD_TS,
    key_columns: &[ColumnSpec::bigint("id", "id")],
    extra_columns: &[ColumnSpec::bigint("invoice_id", "accountingCreditId")],
    required_columns: &["id", "metadata", "extracted_at"],
    pagination: PaginationMode::Cursor,
    enrichment_fields: &[],
    gap_probe: false,
    source: "freight",
};

static PICKUPS: EntitySpec = EntitySpec {
    kind: EntityKind::Pickups,
    table: "pickups",
    timestamp_column: STANDARD_TS,
    key_columns: &[ColumnSpec::bigint("id", "id")],
    extra_columns: &[ColumnSpec::bigint("sequence_code", "sequenceCode")],
    required_columns: &["id", "sequence_code", "metadata", "extracted_at"],
    pagination: PaginationMode::Cursor,
    enrichment_fields: &[],
    gap_probe: false,
    source: "pick",
};

static USERS: EntitySpec = EntitySpec {
    kind: EntityKind::Users,
    table: "dim_users",
    timestamp_column: "updated_at",
    key_columns: &[ColumnSpec::bigint("user_id", "id")],
    extra_columns: &[ColumnSpec::text("name", "name")],
    required_columns: &["user_id", "name", "updated_at"],
    pagination: PaginationMode::Cursor,
    enrichment_fields: &[],
    gap_probe: false,
    source: "user",
};

static OCCURRENCES: EntitySpec = EntitySpec {
    kind: EntityKind::Occurrences,
    table: "occurrences",
    timestamp_column: STANDARD_TS,
    key_columns: &[ColumnSpec::bigint("id", "id")],
    extra_columns: &[ColumnSpec::text("code", "code")],
    required_columns: &["id", "metadata", "extracted_at"],
    pagination: PaginationMode::Pointer,
    enrichment_fields: &[],
    gap_probe: true,
    source: "/api/invoice_occurrences",
};

static MANIFESTS: EntitySpec = EntitySpec {
    kind: EntityKind::Manifests,
    table: "manifests",
    timestamp_column: STANDARD_TS,
    key_columns: &[
        ColumnSpec::bigint("sequence_code", "sequence_code"),
        ColumnSpec::text("unique_identifier", "unique_identifier"),
    ],
    extra_columns: &[ColumnSpec::bigint("pick_sequence_code", "pick_sequence_code")],
    required_columns: &["sequence_code", "unique_identifier", "metadata", "extracted_at"],
    pagination: PaginationMode::Bulk,
    enrichment_fields: &[],
    gap_probe: false,
    source: "manifests",
};

static QUOTES: EntitySpec = EntitySpec {
    kind: EntityKind::Quotes,
    table: "quotes",
    timestamp_column: STANDARD_TS,
    key_columns: &[ColumnSpec::bigint("sequence_code", "sequence_code")],
    extra_columns: &[],
    required_columns: &["sequence_code", "metadata", "extracted_at"],
    pagination: PaginationMode::Bulk,
    enrichment_fields: &[],
    gap_probe: false,
    source: "quotes",
};

static CARGO_LOCATIONS: EntitySpec = EntitySpec {
    kind: EntityKind::CargoLocations,
    table: "cargo_locations",
    timestamp_column: STANDARD_TS,
    key_columns: &[ColumnSpec::bigint("sequence_number", "sequence_number")],
    extra_columns: &[],
    required_columns: &["sequence_number", "metadata", "extracted_at"],
    pagination: PaginationMode::Bulk,
    enrichment_fields: &[],
    gap_probe: false,
    source: "cargo_locations",
};

static PAYABLES: EntitySpec = EntitySpec {
    kind: EntityKind::Payables,
    table: "payables",
    timestamp_column: STANDARD_TS,
    key_columns: &[ColumnSpec::bigint("sequence_code", "sequence_code")],
    extra_columns: &[],
    required_columns: &["sequence_code", "metadata", "extracted_at"],
    pagination: PaginationMode::Bulk,
    enrichment_fields: &[],
    gap_probe: false,
    source: "accounts_payable",
};

static CUSTOMER_INVOICES: EntitySpec = EntitySpec {
    kind: EntityKind::CustomerInvoices,
    table: "customer_invoices",
    timestamp_column: STANDARD_TS,
    key_columns: &[ColumnSpec::text("unique_id", "unique_id")],
    extra_columns: &[],
    required_columns: &["unique_id", "metadata", "extracted_at"],
    pagination: PaginationMode::Bulk,
    enrichment_fields: &[],
    gap_probe: false,
    source: "invoices_by_customer",
};
