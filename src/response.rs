//! Flattened response structs for MCP tool outputs.
//!
//! These structs pull the useful fields out of nested GraphQL payloads,
//! making tool outputs easier for LLM assistants to read.

use serde::Serialize;
use serde_json::Value;

use crate::monarch::queries::{NamedRef, RawAccount, RawTag, RawTransaction};

/// Name of an optional `{ id, name }` reference.
fn ref_name(reference: Option<&NamedRef>) -> Option<String> {
    reference.and_then(|named| named.name.clone())
}

/// Account summary for display.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct AccountResponse {
    /// Account ID.
    id: String,
    /// Display name.
    name: Option<String>,
    /// Account type (e.g. `depository`, `credit`).
    #[serde(rename = "type")]
    account_type: Option<String>,
    /// Current balance.
    balance: Option<f64>,
    /// Institution name.
    institution: Option<String>,
    /// Whether the account is active.
    is_active: bool,
}

impl AccountResponse {
    /// Creates an account summary from a raw account.
    ///
    /// When the API omits `isActive`, an account counts as active unless it
    /// has a deactivation date.
    pub(crate) fn from_account(account: &RawAccount) -> Self {
        let is_active = account
            .is_active
            .unwrap_or_else(|| account.deactivated_at.is_none());
        Self {
            id: account.id.clone(),
            name: account.display_name.clone(),
            account_type: ref_name(account.kind.as_ref()),
            balance: account.current_balance,
            institution: ref_name(account.institution.as_ref()),
            is_active,
        }
    }
}

/// Tag attached to a transaction.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TransactionTagResponse {
    /// Tag ID.
    id: String,
    /// Tag name.
    name: Option<String>,
    /// Hex color.
    color: Option<String>,
}

/// Transaction summary for display.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TransactionResponse {
    /// Transaction ID.
    id: String,
    /// Posting date.
    date: Option<String>,
    /// Signed amount.
    amount: Option<f64>,
    /// Statement description from the institution.
    original_name: Option<String>,
    /// Category name.
    category: Option<String>,
    /// Account display name.
    account: Option<String>,
    /// Merchant name.
    merchant: Option<String>,
    /// User notes.
    notes: Option<String>,
    /// Whether the transaction is still pending.
    is_pending: bool,
    /// Whether the transaction is recurring.
    is_recurring: bool,
    /// Attached tags.
    tags: Vec<TransactionTagResponse>,
}

impl TransactionResponse {
    /// Creates a transaction summary from a raw transaction.
    pub(crate) fn from_transaction(tx: &RawTransaction) -> Self {
        let tags: Vec<TransactionTagResponse> = tx
            .tags
            .iter()
            .map(|tag| TransactionTagResponse {
                id: tag.id.clone(),
                name: tag.name.clone(),
                color: tag.color.clone(),
            })
            .collect();
        Self {
            id: tx.id.clone(),
            date: tx.date.clone(),
            amount: tx.amount,
            original_name: tx.plaid_name.clone(),
            category: ref_name(tx.category.as_ref()),
            account: tx
                .account
                .as_ref()
                .and_then(|account| account.display_name.clone()),
            merchant: ref_name(tx.merchant.as_ref()),
            notes: tx.notes.clone(),
            is_pending: tx.pending,
            is_recurring: tx.is_recurring,
            tags,
        }
    }
}

/// Household tag for display.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TagResponse {
    /// Tag ID.
    id: String,
    /// Tag name.
    name: Option<String>,
    /// Hex color.
    color: Option<String>,
    /// Sort order.
    order: Option<i64>,
    /// Number of tagged transactions.
    #[serde(rename = "transactionCount")]
    transaction_count: Option<i64>,
}

impl TagResponse {
    /// Creates a tag response from a raw tag.
    pub(crate) fn from_tag(tag: &RawTag) -> Self {
        Self {
            id: tag.id.clone(),
            name: tag.name.clone(),
            color: tag.color.clone(),
            order: tag.order,
            transaction_count: tag.transaction_count,
        }
    }
}

/// What a deletion removed, serialized as `<kind>_id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum DeletedItem {
    /// A transaction.
    TransactionId(String),
    /// A transaction tag.
    TagId(String),
    /// A transaction category.
    CategoryId(String),
    /// An account.
    AccountId(String),
}

/// Confirmation of a deletion.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct DeletedResponse {
    /// Always `true`.
    deleted: bool,
    /// Deleted item.
    #[serde(flatten)]
    item: DeletedItem,
    /// Mutation payload, for deletions that report one.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
}

impl DeletedResponse {
    /// Confirms a deletion without a payload.
    pub(crate) const fn new(item: DeletedItem) -> Self {
        Self {
            deleted: true,
            item,
            result: None,
        }
    }

    /// Confirms a deletion and echoes the mutation payload, even when `null`.
    pub(crate) const fn with_result(item: DeletedItem, result: Value) -> Self {
        Self {
            deleted: true,
            item,
            result: Some(result),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use serde_json::json;

    use super::{
        AccountResponse, DeletedItem, DeletedResponse, TagResponse, TransactionResponse,
    };
    use crate::monarch::queries::{RawAccount, RawTag, RawTransaction};

    fn account(value: serde_json::Value) -> RawAccount {
        serde_json::from_value(value).expect("valid account payload")
    }

    #[test]
    fn account_response_flattens_nested_names() {
        let raw = account(json!({
            "id": "acc-1",
            "displayName": "Checking",
            "currentBalance": 1250.5,
            "isActive": true,
            "type": { "name": "depository", "display": "Cash" },
            "institution": { "id": "inst-1", "name": "First Bank" }
        }));
        let resp = AccountResponse::from_account(&raw);
        let value = serde_json::to_value(&resp).expect("serializes");
        assert_eq!(value["name"], "Checking");
        assert_eq!(value["type"], "depository");
        assert_eq!(value["institution"], "First Bank");
        assert_eq!(value["is_active"], true);
    }

    #[test]
    fn account_activity_falls_back_to_deactivation_date() {
        let closed = account(json!({ "id": "acc-2", "deactivatedAt": "2023-05-01" }));
        assert!(!AccountResponse::from_account(&closed).is_active);
        let open = account(json!({ "id": "acc-3", "deactivatedAt": null }));
        assert!(AccountResponse::from_account(&open).is_active);
    }

    #[test]
    fn transaction_response_tolerates_missing_references() {
        let raw: RawTransaction = serde_json::from_value(json!({
            "id": "tx-1",
            "date": "2024-06-15",
            "amount": -4.5,
            "plaidName": "CAFE 123",
            "category": null,
            "merchant": { "id": "m-1", "name": "Cafe" },
            "account": { "id": "acc-1", "displayName": "Checking" },
            "pending": true,
            "tags": [{ "id": "t-1", "name": "Coffee", "color": "#aa0000", "order": 1 }]
        }))
        .expect("valid transaction payload");
        let resp = TransactionResponse::from_transaction(&raw);
        assert_eq!(resp.category, None);
        assert_eq!(resp.merchant.as_deref(), Some("Cafe"));
        assert_eq!(resp.account.as_deref(), Some("Checking"));
        assert_eq!(resp.original_name.as_deref(), Some("CAFE 123"));
        assert!(resp.is_pending);
        assert!(!resp.is_recurring);
        assert_eq!(resp.tags.len(), 1);
    }

    #[test]
    fn tag_response_uses_api_count_key() {
        let raw: RawTag = serde_json::from_value(json!({
            "id": "t-1",
            "name": "Trip",
            "color": "#19D2A5",
            "order": 3,
            "transactionCount": 12
        }))
        .expect("valid tag payload");
        let value = serde_json::to_value(TagResponse::from_tag(&raw)).expect("serializes");
        assert_eq!(value["transactionCount"], 12);
        assert_eq!(value["order"], 3);
    }

    #[test]
    fn deleted_transaction_confirms() {
        let value = serde_json::to_value(DeletedResponse::new(DeletedItem::TransactionId(
            "tx-9".to_owned(),
        )))
        .expect("serializes");
        assert_eq!(value, json!({ "deleted": true, "transaction_id": "tx-9" }));
    }

    #[test]
    fn deletion_payload_is_echoed_even_when_null() {
        let value = serde_json::to_value(DeletedResponse::with_result(
            DeletedItem::AccountId("acc-1".to_owned()),
            serde_json::Value::Null,
        ))
        .expect("serializes");
        assert_eq!(
            value,
            json!({ "deleted": true, "account_id": "acc-1", "result": null })
        );
    }
}
