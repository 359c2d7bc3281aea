//! Parameter structs for MCP tool inputs.
//!
//! Each struct derives [`serde::Deserialize`] and [`schemars::JsonSchema`]
//! so that `rmcp` can auto-generate JSON schemas for tool parameters.

use schemars::JsonSchema;
use serde::Deserialize;

/// Default page size for `get_transactions`.
const fn default_limit() -> u32 {
    100
}

/// Parameters for the `get_transactions` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct GetTransactionsParams {
    /// Number of transactions to return (default 100).
    #[serde(default = "default_limit")]
    pub(crate) limit: u32,
    /// Number of transactions to skip (default 0).
    #[serde(default)]
    pub(crate) offset: u32,
    /// Start date (inclusive), format `YYYY-MM-DD`. Requires `end_date`.
    pub(crate) start_date: Option<String>,
    /// End date (inclusive), format `YYYY-MM-DD`. Requires `start_date`.
    pub(crate) end_date: Option<String>,
    /// Single account ID to filter by. Cannot be combined with `account_ids`.
    pub(crate) account_id: Option<String>,
    /// Free-text search.
    pub(crate) search: Option<String>,
    /// Category IDs to filter by.
    pub(crate) category_ids: Option<Vec<String>>,
    /// Account IDs to filter by. Cannot be combined with `account_id`.
    pub(crate) account_ids: Option<Vec<String>>,
    /// Tag IDs to filter by.
    pub(crate) tag_ids: Option<Vec<String>>,
    /// Only transactions with (or without) attachments.
    pub(crate) has_attachments: Option<bool>,
    /// Only transactions with (or without) notes.
    pub(crate) has_notes: Option<bool>,
    /// Only transactions hidden from (or shown in) reports.
    pub(crate) hidden_from_reports: Option<bool>,
    /// Only split (or unsplit) transactions.
    pub(crate) is_split: Option<bool>,
    /// Only recurring (or one-off) transactions.
    pub(crate) is_recurring: Option<bool>,
    /// Only synced (or manually entered) transactions.
    pub(crate) synced_from_institution: Option<bool>,
}

/// Parameters for tools taking an optional date range.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub(crate) struct DateRangeParams {
    /// Start date, format `YYYY-MM-DD`. Requires `end_date`.
    pub(crate) start_date: Option<String>,
    /// End date, format `YYYY-MM-DD`. Requires `start_date`.
    pub(crate) end_date: Option<String>,
}

/// Parameters for tools acting on one account.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct AccountIdParams {
    /// Account ID.
    pub(crate) account_id: String,
}

/// Parameters for the `create_transaction` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct CreateTransactionParams {
    /// Account to add the transaction to.
    pub(crate) account_id: String,
    /// Amount: positive for income, negative for expenses.
    pub(crate) amount: f64,
    /// Merchant name.
    pub(crate) merchant_name: String,
    /// Category ID.
    pub(crate) category_id: String,
    /// Transaction date, format `YYYY-MM-DD`.
    pub(crate) date: String,
    /// Optional notes.
    pub(crate) notes: Option<String>,
    /// Whether to adjust the account balance (default false).
    #[serde(default)]
    pub(crate) update_balance: bool,
}

/// Parameters for the `update_transaction` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct UpdateTransactionParams {
    /// Transaction to update.
    pub(crate) transaction_id: String,
    /// New category ID.
    pub(crate) category_id: Option<String>,
    /// New merchant name.
    pub(crate) merchant_name: Option<String>,
    /// Goal ID to associate with the transaction.
    pub(crate) goal_id: Option<String>,
    /// New amount.
    pub(crate) amount: Option<f64>,
    /// New date, format `YYYY-MM-DD`.
    pub(crate) date: Option<String>,
    /// Whether to hide the transaction from reports.
    pub(crate) hide_from_reports: Option<bool>,
    /// Whether the transaction needs review.
    pub(crate) needs_review: Option<bool>,
    /// Transaction notes.
    pub(crate) notes: Option<String>,
}

/// Parameters for tools acting on one transaction.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct TransactionIdParams {
    /// Transaction ID.
    pub(crate) transaction_id: String,
}

/// Parameters for the `create_transaction_tag` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct CreateTagParams {
    /// Tag name.
    pub(crate) name: String,
    /// Hex RGB color including `#`, e.g. `#19D2A5`.
    pub(crate) color: String,
}

/// Parameters for the `set_transaction_tags` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct SetTransactionTagsParams {
    /// Transaction to tag.
    pub(crate) transaction_id: String,
    /// Tags to apply; replaces existing tags. An empty list removes all tags.
    pub(crate) tag_ids: Vec<String>,
}

/// Parameters for the `delete_transaction_tag` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct TagIdParams {
    /// Tag to delete.
    pub(crate) tag_id: String,
}

/// Parameters for the `delete_transaction_category` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct CategoryIdParams {
    /// Category to delete.
    pub(crate) category_id: String,
}

/// Default category icon.
fn default_icon() -> String {
    "\u{2753}".to_owned()
}

/// Default rollover period.
fn default_rollover_type() -> String {
    "monthly".to_owned()
}

/// Parameters for the `create_transaction_category` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct CreateCategoryParams {
    /// Category group the new category belongs to.
    pub(crate) group_id: String,
    /// Category name.
    pub(crate) name: String,
    /// Emoji icon (default a question mark).
    #[serde(default = "default_icon")]
    pub(crate) icon: String,
    /// Whether unspent budget rolls over (default false).
    #[serde(default)]
    pub(crate) rollover_enabled: bool,
    /// Rollover period (default `monthly`).
    #[serde(default = "default_rollover_type")]
    pub(crate) rollover_type: String,
    /// First rollover month as `YYYY-MM-DD` (default the current month).
    pub(crate) rollover_start_month: Option<String>,
}

/// Default for `redirect_posted`.
const fn default_true() -> bool {
    true
}

/// Parameters for the `get_transaction_details` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct TransactionDetailsParams {
    /// Transaction ID.
    pub(crate) transaction_id: String,
    /// Follow a pending transaction to its posted version (default true).
    #[serde(default = "default_true")]
    pub(crate) redirect_posted: bool,
}

/// One split of a transaction.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SplitParams {
    /// Merchant shown on the split.
    pub(crate) merchant_name: String,
    /// Part of the original amount.
    pub(crate) amount: f64,
    /// Category of the split.
    pub(crate) category_id: String,
    /// Optional notes.
    pub(crate) notes: Option<String>,
}

/// Parameters for the `update_transaction_splits` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct UpdateSplitsParams {
    /// Transaction to split.
    pub(crate) transaction_id: String,
    /// Splits with `merchantName`, `amount` and `categoryId`. Amounts must add
    /// up to the transaction amount. An empty list removes all splits.
    pub(crate) split_data: Vec<SplitParams>,
}

/// Parameters for the `get_cashflow_summary` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct CashflowSummaryParams {
    /// Number of records to aggregate (default 100).
    #[serde(default = "default_limit")]
    pub(crate) limit: u32,
    /// Start date, format `YYYY-MM-DD`. Requires `end_date`.
    pub(crate) start_date: Option<String>,
    /// End date, format `YYYY-MM-DD`. Requires `start_date`.
    pub(crate) end_date: Option<String>,
}

/// Default budget period.
fn default_budget_timeframe() -> String {
    "month".to_owned()
}

/// Parameters for the `set_budget_amount` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct SetBudgetAmountParams {
    /// Budget amount to set.
    pub(crate) amount: f64,
    /// Category ID. Give exactly one of `category_id` and `category_group_id`.
    pub(crate) category_id: Option<String>,
    /// Category group ID. Give exactly one of `category_id` and `category_group_id`.
    pub(crate) category_group_id: Option<String>,
    /// Budget period, `month` or `week` (default `month`).
    #[serde(default = "default_budget_timeframe")]
    pub(crate) timeframe: String,
    /// First day of the period, format `YYYY-MM-DD` (default the current month).
    pub(crate) start_date: Option<String>,
    /// Apply the amount to later periods too (default false).
    #[serde(default)]
    pub(crate) apply_to_future: bool,
}

/// Parameters for the `create_manual_account` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct CreateManualAccountParams {
    /// Account name.
    pub(crate) account_name: String,
    /// Account type, see `get_account_type_options`.
    pub(crate) account_type: String,
    /// Account subtype.
    pub(crate) account_sub_type: String,
    /// Whether the balance counts toward net worth.
    pub(crate) is_in_net_worth: bool,
    /// Opening balance (default 0).
    #[serde(default)]
    pub(crate) account_balance: f64,
}

/// Parameters for the `update_account` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct UpdateAccountParams {
    /// Account to update.
    pub(crate) account_id: String,
    /// New account name.
    pub(crate) account_name: Option<String>,
    /// New balance.
    pub(crate) account_balance: Option<f64>,
    /// New account type.
    pub(crate) account_type: Option<String>,
    /// New account subtype.
    pub(crate) account_sub_type: Option<String>,
    /// Whether the balance counts toward net worth.
    pub(crate) include_in_net_worth: Option<bool>,
    /// Whether to hide the account from the summary list.
    pub(crate) hide_from_summary_list: Option<bool>,
    /// Whether to hide the account's transactions from reports.
    pub(crate) hide_transactions_from_reports: Option<bool>,
}

/// Parameters for the `get_recent_account_balances` tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub(crate) struct RecentBalancesParams {
    /// First day, format `YYYY-MM-DD` (default 31 days ago).
    pub(crate) start_date: Option<String>,
}

/// Parameters for the `get_account_snapshots_by_type` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct SnapshotsByTypeParams {
    /// First day, format `YYYY-MM-DD`.
    pub(crate) start_date: String,
    /// Aggregation period: `month` or `year`.
    pub(crate) timeframe: String,
}

/// Parameters for the `get_aggregate_snapshots` tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub(crate) struct AggregateSnapshotsParams {
    /// First day, format `YYYY-MM-DD`.
    pub(crate) start_date: Option<String>,
    /// Last day, format `YYYY-MM-DD`.
    pub(crate) end_date: Option<String>,
    /// Only accounts of this type.
    pub(crate) account_type: Option<String>,
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use super::{
        CreateCategoryParams, CreateManualAccountParams, CreateTagParams, CreateTransactionParams,
        DateRangeParams, GetTransactionsParams, SetBudgetAmountParams, SetTransactionTagsParams,
        TransactionDetailsParams, UpdateSplitsParams, UpdateTransactionParams,
    };

    #[test]
    fn get_transactions_defaults() {
        let params: GetTransactionsParams =
            serde_json::from_str("{}").expect("should deserialize empty object");
        assert_eq!(params.limit, 100);
        assert_eq!(params.offset, 0);
        assert!(params.start_date.is_none());
        assert!(params.account_ids.is_none());
        assert!(params.has_notes.is_none());
    }

    #[test]
    fn get_transactions_full() {
        let json = r#"{
            "limit": 25,
            "offset": 50,
            "start_date": "2024-01-01",
            "end_date": "2024-01-31",
            "search": "coffee",
            "category_ids": ["cat-1"],
            "account_ids": ["acc-1", "acc-2"],
            "tag_ids": ["tag-1"],
            "has_notes": true,
            "is_recurring": false
        }"#;
        let params: GetTransactionsParams =
            serde_json::from_str(json).expect("should deserialize full params");
        assert_eq!(params.limit, 25);
        assert_eq!(params.offset, 50);
        assert_eq!(params.search.as_deref(), Some("coffee"));
        assert_eq!(params.account_ids.as_ref().map(Vec::len), Some(2));
        assert_eq!(params.has_notes, Some(true));
        assert_eq!(params.is_recurring, Some(false));
    }

    #[test]
    fn date_range_is_optional() {
        let params: DateRangeParams =
            serde_json::from_str("{}").expect("should deserialize empty");
        assert!(params.start_date.is_none());
        assert!(params.end_date.is_none());
    }

    #[test]
    fn create_transaction_minimal() {
        let json = r#"{
            "account_id": "acc-1",
            "amount": -12.5,
            "merchant_name": "Cafe",
            "category_id": "cat-1",
            "date": "2024-06-15"
        }"#;
        let params: CreateTransactionParams =
            serde_json::from_str(json).expect("should deserialize minimal");
        assert!((params.amount + 12.5).abs() < f64::EPSILON);
        assert!(params.notes.is_none());
        assert!(!params.update_balance);
    }

    #[test]
    fn update_transaction_requires_an_id() {
        let result = serde_json::from_str::<UpdateTransactionParams>(r#"{"notes": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn tag_params() {
        let tag: CreateTagParams = serde_json::from_str(r##"{"name": "Trip", "color": "#19D2A5"}"##)
            .expect("should deserialize");
        assert_eq!(tag.color, "#19D2A5");
        let set: SetTransactionTagsParams =
            serde_json::from_str(r#"{"transaction_id": "tx-1", "tag_ids": []}"#)
                .expect("should deserialize");
        assert!(set.tag_ids.is_empty());
    }

    #[test]
    fn category_defaults() {
        let params: CreateCategoryParams =
            serde_json::from_str(r#"{"group_id": "grp-1", "name": "Pets"}"#)
                .expect("should deserialize");
        assert_eq!(params.icon, "\u{2753}");
        assert!(!params.rollover_enabled);
        assert_eq!(params.rollover_type, "monthly");
        assert!(params.rollover_start_month.is_none());
    }

    #[test]
    fn details_follow_posted_transactions_by_default() {
        let params: TransactionDetailsParams =
            serde_json::from_str(r#"{"transaction_id": "tx-1"}"#).expect("should deserialize");
        assert!(params.redirect_posted);
    }

    #[test]
    fn splits_use_api_field_names() {
        let json = r#"{
            "transaction_id": "tx-1",
            "split_data": [
                {"merchantName": "Store", "amount": -30.0, "categoryId": "cat-1"},
                {"merchantName": "Store", "amount": -20.0, "categoryId": "cat-2", "notes": "gift"}
            ]
        }"#;
        let params: UpdateSplitsParams = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(params.split_data.len(), 2);
        assert_eq!(
            params.split_data.last().and_then(|split| split.notes.as_deref()),
            Some("gift")
        );
        let _err = serde_json::from_str::<UpdateSplitsParams>(
            r#"{"transaction_id": "tx-1", "split_data": [{"amount": 1.0}]}"#,
        )
        .expect_err("splits need a merchant and a category");
    }

    #[test]
    fn budget_defaults_to_monthly() {
        let params: SetBudgetAmountParams =
            serde_json::from_str(r#"{"amount": 250.0, "category_id": "cat-1"}"#)
                .expect("should deserialize");
        assert_eq!(params.timeframe, "month");
        assert!(!params.apply_to_future);
        assert!(params.category_group_id.is_none());
    }

    #[test]
    fn manual_account_balance_defaults_to_zero() {
        let json = r#"{
            "account_name": "Cash jar",
            "account_type": "depository",
            "account_sub_type": "checking",
            "is_in_net_worth": true
        }"#;
        let params: CreateManualAccountParams =
            serde_json::from_str(json).expect("should deserialize");
        assert!(params.account_balance.abs() < f64::EPSILON);
    }
}
