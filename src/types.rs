use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;
use tracing_error::SpanTrace;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in the transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    #[serde(rename = "inProgress")]
    pub in_progress: bool,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            in_progress: false,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            in_progress: false,
        }
    }
}

/// Per-scan classification of the buffered stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Pending,
    ListResult,
    RecordResult,
    PlainText,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CustomerRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct SalesItemLineDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_ref: Option<ItemRef>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub qty: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub unit_price: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_item_line_detail: Option<SalesItemLineDetail>,
}

/// Invoice record as returned by the accounting backend's tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    #[serde(rename = "Id", default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(rename = "DocNumber", default, deserialize_with = "lenient_string")]
    pub doc_number: Option<String>,
    #[serde(rename = "TxnDate", default, skip_serializing_if = "Option::is_none")]
    pub txn_date: Option<String>,
    #[serde(rename = "DueDate", default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(rename = "CustomerRef", default, skip_serializing_if = "Option::is_none")]
    pub customer_ref: Option<CustomerRef>,
    #[serde(rename = "TotalAmt", default, deserialize_with = "lenient_amount")]
    pub total_amount: Option<f64>,
    #[serde(rename = "Balance", default, deserialize_with = "lenient_amount")]
    pub balance: Option<f64>,
    #[serde(rename = "Line", default, skip_serializing_if = "Vec::is_empty")]
    pub line_items: Vec<InvoiceLine>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Invoice {
    pub fn customer_name(&self) -> Option<&str> {
        self.customer_ref.as_ref().and_then(|c| c.name.as_deref())
    }

    /// Best label for display: document number, then backend id.
    pub fn label(&self) -> &str {
        match (&self.doc_number, &self.id) {
            (Some(doc), _) => doc,
            (None, Some(id)) => id,
            (None, None) => "?",
        }
    }
}

/// A tool's output, handed to the host exactly once per turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum StructuredResult {
    InvoiceList(Vec<Invoice>),
    InvoiceRecord(Box<Invoice>),
}

impl StructuredResult {
    pub fn disposition(&self) -> Disposition {
        match self {
            StructuredResult::InvoiceList(_) => Disposition::ListResult,
            StructuredResult::InvoiceRecord(_) => Disposition::RecordResult,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StructuredResult::InvoiceList(list) => list.len(),
            StructuredResult::InvoiceRecord(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn invoices(&self) -> Vec<&Invoice> {
        match self {
            StructuredResult::InvoiceList(list) => list.iter().collect(),
            StructuredResult::InvoiceRecord(record) => vec![record.as_ref()],
        }
    }
}

/// Why a turn ended on a canned message instead of a result or narration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    InvoiceNotFound(String),
    ToolNoMatch,
    ToolNotUsed,
}

/// Terminal state reached by one submitted turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    StructuredResult {
        disposition: Disposition,
        count: usize,
    },
    Narration,
    Fallback(FallbackReason),
    TransportFailure,
}

fn lenient_amount<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Error, Debug)]
pub enum InterpreterError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upstream error (status {0}): {1}")]
    Upstream(reqwest::StatusCode, String),

    #[error("Response had no body")]
    MissingBody,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Input is empty")]
    EmptyInput,

    #[error("A reveal is already in progress")]
    RevealInFlight,

    #[error("Internal error: {0}")]
    Internal(String, SpanTrace),
}

#[derive(Debug)]
pub struct ObservedError {
    pub inner: InterpreterError,
    pub span_trace: SpanTrace,
}

impl std::fmt::Display for ObservedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n\nSpan Trace:\n{}", self.inner, self.span_trace)
    }
}

impl std::error::Error for ObservedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

impl<E> From<E> for ObservedError
where
    E: Into<InterpreterError>,
{
    fn from(error: E) -> Self {
        Self {
            inner: error.into(),
            span_trace: SpanTrace::capture(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObservedError>;
