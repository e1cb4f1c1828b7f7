//! Result classifier.
//!
//! Decides whether a decoded payload is an invoice list, a single invoice, or
//! neither. Field names follow the upstream tool contract verbatim.

use crate::constants::{
    DOC_NUMBER_FIELD, ERROR_FIELD, ID_FIELD, INVOICE_FIELD, QUERY_RESPONSE_FIELD, RESULT_FIELD,
    TOTAL_AMOUNT_FIELD,
};
use crate::types::{Disposition, Invoice, StructuredResult};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Result(StructuredResult),
    /// Decoded fine but is not a result. `tool_output` records whether it
    /// still looked like something a tool returned.
    Miss { tool_output: bool },
}

impl Classification {
    pub fn disposition(&self) -> Disposition {
        match self {
            Classification::Result(result) => result.disposition(),
            Classification::Miss { .. } => Disposition::PlainText,
        }
    }
}

/// Contract form: decoded value in, disposition out.
pub fn disposition_of(decoded: &Value) -> Disposition {
    classify(decoded).disposition()
}

pub fn classify(decoded: &Value) -> Classification {
    let target = unwrap_envelope(decoded);

    if let Some(list) = as_invoice_list(target) {
        return Classification::Result(list);
    }
    if let Some(record) = as_invoice_record(target) {
        return Classification::Result(record);
    }

    Classification::Miss {
        tool_output: looks_like_tool_output(decoded),
    }
}

/// Tool-call envelopes wrap the payload under `result`; backend query
/// responses wrap it under `QueryResponse.Invoice` or `Invoice`.
fn unwrap_envelope(decoded: &Value) -> &Value {
    let inner = match decoded.get(RESULT_FIELD) {
        Some(result) if !result.is_null() => result,
        _ => decoded,
    };

    if let Some(invoices) = inner
        .get(QUERY_RESPONSE_FIELD)
        .and_then(|q| q.get(INVOICE_FIELD))
    {
        return invoices;
    }
    if let Some(invoices) = inner.get(INVOICE_FIELD) {
        if invoices.is_array() || invoices.is_object() {
            return invoices;
        }
    }
    inner
}

fn has_field(value: &Value, field: &str) -> bool {
    match value.get(field) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn as_invoice_list(value: &Value) -> Option<StructuredResult> {
    let items = value.as_array()?;
    let first = items.first()?;
    if !has_field(first, DOC_NUMBER_FIELD) {
        return None;
    }
    match serde_json::from_value::<Vec<Invoice>>(value.clone()) {
        Ok(list) => Some(StructuredResult::InvoiceList(list)),
        Err(e) => {
            tracing::debug!("[CLASSIFY] List-shaped payload failed to decode: {}", e);
            None
        }
    }
}

fn as_invoice_record(value: &Value) -> Option<StructuredResult> {
    if !value.is_object() {
        return None;
    }
    let identified = has_field(value, ID_FIELD) || has_field(value, DOC_NUMBER_FIELD);
    let totalled = matches!(value.get(TOTAL_AMOUNT_FIELD), Some(Value::Number(_)));
    if !(identified && totalled) {
        return None;
    }
    match serde_json::from_value::<Invoice>(value.clone()) {
        Ok(record) => Some(StructuredResult::InvoiceRecord(Box::new(record))),
        Err(e) => {
            tracing::debug!("[CLASSIFY] Record-shaped payload failed to decode: {}", e);
            None
        }
    }
}

/// Tool output that did not classify: result envelopes, tool errors, and
/// invoice-ish values missing required fields. Transport bookkeeping such as
/// finish markers and tool-call announcements does not count.
pub fn looks_like_tool_output(decoded: &Value) -> bool {
    if decoded.get(RESULT_FIELD).is_some() || has_field(decoded, ERROR_FIELD) {
        return true;
    }
    let invoiceish = |v: &Value| has_field(v, ID_FIELD) || has_field(v, DOC_NUMBER_FIELD);
    match decoded {
        Value::Array(items) => items.first().is_some_and(invoiceish),
        Value::Object(_) => invoiceish(decoded),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_list_classifies_as_list() {
        let payload = json!({"result": [{"DocNumber": "1"}, {"DocNumber": "2"}]});
        match classify(&payload) {
            Classification::Result(StructuredResult::InvoiceList(list)) => {
                assert_eq!(list.len(), 2);
                assert_eq!(list[1].doc_number.as_deref(), Some("2"));
            }
            other => panic!("expected list, got {:?}", other),
        }
        assert_eq!(disposition_of(&payload), Disposition::ListResult);
    }

    #[test]
    fn test_bare_record_classifies_as_record() {
        let payload = json!({"Id": "42", "TotalAmt": 100});
        match classify(&payload) {
            Classification::Result(StructuredResult::InvoiceRecord(record)) => {
                assert_eq!(record.id.as_deref(), Some("42"));
                assert_eq!(record.total_amount, Some(100.0));
            }
            other => panic!("expected record, got {:?}", other),
        }
        assert_eq!(disposition_of(&payload), Disposition::RecordResult);
    }

    #[test]
    fn test_record_requires_numeric_total() {
        let payload = json!({"result": {"Id": "42", "TotalAmt": "100"}});
        assert_eq!(
            classify(&payload),
            Classification::Miss { tool_output: true }
        );
    }

    #[test]
    fn test_list_requires_doc_number_on_first_element() {
        let payload = json!([{"Id": "1"}, {"DocNumber": "2"}]);
        assert_eq!(disposition_of(&payload), Disposition::PlainText);

        let empty = json!({"result": []});
        assert_eq!(disposition_of(&empty), Disposition::PlainText);
    }

    #[test]
    fn test_query_response_envelope_is_unwrapped() {
        let payload = json!({"QueryResponse": {"Invoice": [{"DocNumber": "1001", "TotalAmt": 5}]}});
        assert_eq!(disposition_of(&payload), Disposition::ListResult);

        let single = json!({"result": {"Invoice": {"Id": "9", "DocNumber": "1009", "TotalAmt": 12.5}}});
        assert_eq!(disposition_of(&single), Disposition::RecordResult);
    }

    #[test]
    fn test_metadata_is_not_tool_output() {
        let finish = json!({"finishReason": "stop", "usage": {"promptTokens": 10}});
        assert_eq!(classify(&finish), Classification::Miss { tool_output: false });

        let call = json!({"toolCallId": "c1", "toolName": "getInvoiceByIdFromApi", "args": {"invoiceId": "4"}});
        assert_eq!(classify(&call), Classification::Miss { tool_output: false });
    }

    #[test]
    fn test_tool_error_counts_as_tool_output() {
        let payload = json!({"toolCallId": "c1", "result": {"error": "Missing QuickBooks credentials"}});
        assert_eq!(classify(&payload), Classification::Miss { tool_output: true });
    }
}
