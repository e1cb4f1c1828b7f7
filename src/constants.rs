/// Metadata field names that mark a line as transport/tool-call bookkeeping
pub const METADATA_FIELD_NAMES: &[&str] = &[
    "promptTokens",
    "completionTokens",
    "prompt_tokens",
    "completion_tokens",
    "totalTokens",
    "total_tokens",
    "finishReason",
    "finish_reason",
    "isContinued",
    "toolCallId",
    "tool_call_id",
    "toolName",
    "tool_name",
    "messageId",
];

/// Tools the assistant may announce; a line naming one is call bookkeeping
pub const TOOL_NAMES: &[&str] = &[
    "getInvoiceByIdFromApi",
    "getTop5InvoicesFromApi",
    "getInvoicesByCustomerNameFromApi",
    "sendInvoicePdfFromApi",
    "listUnpaidInvoices",
    "getCompanyInfo",
    "convertTemperature",
];

/// Envelope field carrying a tool's real output
pub const RESULT_FIELD: &str = "result";

/// Backend query envelope the host normalizes when it loads invoices directly
pub const QUERY_RESPONSE_FIELD: &str = "QueryResponse";
pub const INVOICE_FIELD: &str = "Invoice";

/// Invoice field names fixed by the upstream tool contract
pub const ID_FIELD: &str = "Id";
pub const DOC_NUMBER_FIELD: &str = "DocNumber";
pub const TOTAL_AMOUNT_FIELD: &str = "TotalAmt";
pub const ERROR_FIELD: &str = "error";

/// User-facing terminal messages
pub const TOOL_NO_MATCH_MESSAGE: &str =
    "The invoice tool ran, but nothing in its response looked like an invoice.";
pub const TOOL_NOT_USED_MESSAGE: &str =
    "Either the tool was not called or the call failed. Try rephrasing your question.";
pub const TRANSPORT_ERROR_MESSAGE: &str =
    "Something went wrong while contacting the assistant. Please try again.";

pub fn invoice_not_found_message(number: &str) -> String {
    format!(
        "I couldn't find invoice {}. Double-check the number and try again.",
        number
    )
}

pub fn result_delivered_message(count: usize) -> String {
    match count {
        1 => "Loaded 1 invoice into the panel.".to_string(),
        n => format!("Loaded {} invoices into the panel.", n),
    }
}

/// Defaults
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/api/chat";
pub const DEFAULT_TYPING_INTERVAL_MS: u64 = 10;
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1024 * 1024;
pub const TRANSCRIPT_EVENT_CAPACITY: usize = 1024;
