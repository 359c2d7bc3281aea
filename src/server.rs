//! MCP server exposing Monarch Money operations as tools.
//!
//! Uses `rmcp` macros to register the tools. Every remote call goes through
//! [`SessionManager::call`], so an expired session triggers sign-in again
//! instead of surfacing as an opaque failure. Inputs are validated before
//! anything is sent to the API.

use chrono::{Datelike as _, Days, Local, Months, NaiveDate};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use serde_json::json;

use crate::auth::session::{CallError, SessionManager};
use crate::monarch::ApiError;
use crate::monarch::queries::{
    self, AccountUpdate, BudgetAmount, BudgetTarget, NewAccount, NewCategory, NewTransaction,
    SnapshotFilter, Split, TransactionQuery, TransactionUpdate,
};
use crate::params::{
    AccountIdParams, AggregateSnapshotsParams, CashflowSummaryParams, CategoryIdParams,
    CreateCategoryParams, CreateManualAccountParams, CreateTagParams, CreateTransactionParams,
    DateRangeParams, GetTransactionsParams, RecentBalancesParams, SetBudgetAmountParams,
    SetTransactionTagsParams, SnapshotsByTypeParams, TagIdParams, TransactionDetailsParams,
    TransactionIdParams, UpdateAccountParams, UpdateSplitsParams, UpdateTransactionParams,
};
use crate::response::{
    AccountResponse, DeletedItem, DeletedResponse, TagResponse, TransactionResponse,
};

/// Tools that change data; registered only when writes are enabled.
const WRITE_TOOLS: [&str; 13] = [
    "create_transaction",
    "update_transaction",
    "delete_transaction",
    "create_transaction_tag",
    "delete_transaction_tag",
    "set_transaction_tags",
    "update_transaction_splits",
    "create_transaction_category",
    "delete_transaction_category",
    "set_budget_amount",
    "create_manual_account",
    "update_account",
    "delete_account",
];

/// Days of history `get_recent_account_balances` returns by default.
const RECENT_BALANCE_DAYS: u64 = 31;

/// Instructions returned by `setup_authentication`.
const SETUP_INSTRUCTIONS: &str = "\
Monarch Money authentication

Signing in happens in your browser:

1. When no saved session exists, the server opens a local sign-in page in
   your default browser.
2. Enter your Monarch Money email and password.
3. If your account uses multi-factor authentication, enter the code from
   your authenticator app.
4. The session token is stored in your system keyring and reused on every
   start until it expires.

When a session expires during a tool call, the token is discarded and the
sign-in page opens again. Your password is typed into the local page only
and never passes through the assistant.

For machines without a browser, set MONARCH_EMAIL and MONARCH_PASSWORD in
the environment (or a .env file) and the server signs in with them.";

/// Outcome of a tool handler.
type ToolResult = Result<CallToolResult, McpError>;

/// MCP server wrapping the Monarch Money API.
#[derive(Clone)]
pub(crate) struct MonarchMcpServer {
    /// Session-aware access to the API.
    session: SessionManager,
    /// Tool router for dispatching MCP tool calls.
    tool_router: ToolRouter<Self>,
}

impl core::fmt::Debug for MonarchMcpServer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MonarchMcpServer")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Parses a date string in `YYYY-MM-DD` format.
fn parse_date(date_str: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|err| format!("Invalid date '{date_str}': {err}. Use YYYY-MM-DD."))
}

/// Validates an optional date range where both ends must be given together.
fn date_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Option<(NaiveDate, NaiveDate)>, String> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(start_str), Some(end_str)) => {
            let from = parse_date(start_str)?;
            let to = parse_date(end_str)?;
            if from > to {
                return Err("start_date must not be after end_date.".to_owned());
            }
            Ok(Some((from, to)))
        }
        (Some(_), None) | (None, Some(_)) => {
            Err("Both start_date and end_date are required when filtering by date.".to_owned())
        }
    }
}

/// First day of last month through the last day of next month.
fn budget_window(today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let this_month = today.with_day(1)?;
    let from = this_month.checked_sub_months(Months::new(1))?;
    let to = this_month.checked_add_months(Months::new(2))?.pred_opt()?;
    Some((from, to))
}

/// First through last day of the current month.
fn current_month(today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let from = today.with_day(1)?;
    let to = from.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((from, to))
}

/// Resolves a requested date range, falling back to `default` around today.
fn resolve_range(
    params: &DateRangeParams,
    default: fn(NaiveDate) -> Option<(NaiveDate, NaiveDate)>,
) -> Result<(String, String), String> {
    let range = match date_range(params.start_date.as_deref(), params.end_date.as_deref())? {
        Some(range) => range,
        None => default(today())
            .ok_or_else(|| "Could not compute the default date range.".to_owned())?,
    };
    Ok((range.0.to_string(), range.1.to_string()))
}

/// Validates a date that may be omitted.
fn optional_date(value: Option<&str>) -> Result<Option<NaiveDate>, String> {
    value.map(parse_date).transpose()
}

/// Today in local time.
fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// First day of the month `date` falls in.
fn month_start(date: NaiveDate) -> Result<NaiveDate, String> {
    date.with_day(1)
        .ok_or_else(|| format!("Could not compute the first day of the month of {date}."))
}

/// Builds the aggregate snapshot filter; each bound is optional.
fn snapshot_filter(args: AggregateSnapshotsParams) -> Result<SnapshotFilter, String> {
    let start = optional_date(args.start_date.as_deref())?;
    let end = optional_date(args.end_date.as_deref())?;
    if matches!((start, end), (Some(from), Some(to)) if from > to) {
        return Err("start_date must not be after end_date.".to_owned());
    }
    Ok(SnapshotFilter {
        start_date: start.as_ref().map(ToString::to_string),
        end_date: end.as_ref().map(ToString::to_string),
        account_type: args.account_type,
    })
}

/// Picks the budget target; exactly one ID must be given.
fn budget_target(
    category_id: Option<String>,
    category_group_id: Option<String>,
) -> Result<BudgetTarget, String> {
    match (category_id, category_group_id) {
        (Some(id), None) => Ok(BudgetTarget::Category(id)),
        (None, Some(id)) => Ok(BudgetTarget::Group(id)),
        (Some(_), Some(_)) | (None, None) => {
            Err("Provide exactly one of category_id or category_group_id.".to_owned())
        }
    }
}

/// Builds an account update, rejecting blank names and empty updates.
fn account_update(args: &UpdateAccountParams) -> Result<AccountUpdate, String> {
    let name = match args.account_name.as_deref().map(str::trim) {
        Some("") => return Err("Account name cannot be empty".to_owned()),
        other => other.map(str::to_owned),
    };
    let update = AccountUpdate {
        name,
        balance: args.account_balance,
        account_type: args.account_type.clone(),
        sub_type: args.account_sub_type.clone(),
        include_in_net_worth: args.include_in_net_worth,
        hide_from_list: args.hide_from_summary_list,
        hide_transactions_from_reports: args.hide_transactions_from_reports,
    };
    if update.is_empty() {
        return Err("At least one field to update is required.".to_owned());
    }
    Ok(update)
}

/// Checks a `#RRGGBB` color.
fn is_hex_color(color: &str) -> bool {
    color
        .strip_prefix('#')
        .is_some_and(|hex| hex.len() == 6 && hex.chars().all(|ch| ch.is_ascii_hexdigit()))
}

/// Serializes a value to a pretty-printed JSON string for tool output.
fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String, McpError> {
    serde_json::to_string_pretty(value).map_err(|err| {
        McpError::internal_error(format!("failed to serialize response: {err}"), None)
    })
}

/// Creates a successful tool result containing JSON text.
fn json_result<T: serde::Serialize>(value: &T) -> ToolResult {
    let text = to_json_text(value)?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// Creates an error result for input rejected before any remote call.
fn invalid(message: &str) -> ToolResult {
    let text = to_json_text(&json!({ "error": message }))?;
    Ok(CallToolResult::error(vec![Content::text(text)]))
}

/// Readable detail for an API fault.
fn api_detail(err: ApiError) -> String {
    match err {
        ApiError::Http { .. } => format!("Monarch API returned {err}"),
        ApiError::Query(message) => format!("API query failed: {message}"),
        ApiError::Transport(source) => format!("connection error: {source}"),
        ApiError::LoginFailed(_)
        | ApiError::MfaRequired
        | ApiError::Decode(_)
        | ApiError::InvalidUrl(_)
        | ApiError::InvalidToken => err.to_string(),
    }
}

/// Creates an error result for a failed call, e.g. `Error getting accounts: ...`.
fn tool_failure(operation: &str, err: CallError) -> ToolResult {
    let detail = match err {
        CallError::Api(api) => api_detail(api),
        other @ (CallError::SessionExpired(_)
        | CallError::EnvironmentSessionExpired(_)
        | CallError::AuthenticationRequired
        | CallError::CredentialsRejected(_)
        | CallError::Task(_)) => other.to_string(),
    };
    tracing::error!(operation, error = %detail, "tool call failed");
    Ok(CallToolResult::error(vec![Content::text(format!(
        "Error {operation}: {detail}"
    ))]))
}

/// Turns a call outcome into a JSON tool result.
fn reply<T: serde::Serialize>(operation: &str, outcome: Result<T, CallError>) -> ToolResult {
    match outcome {
        Ok(value) => json_result(&value),
        Err(err) => tool_failure(operation, err),
    }
}

#[tool_router]
impl MonarchMcpServer {
    /// Creates a new MCP server; write tools are registered only if `enable_write`.
    pub(crate) fn new(session: SessionManager, enable_write: bool) -> Self {
        let mut tool_router = Self::tool_router();
        if !enable_write {
            for name in WRITE_TOOLS {
                tool_router.remove_route(name);
            }
        }
        tracing::info!(enable_write, "tool surface configured");
        Self {
            session,
            tool_router,
        }
    }

    // ── Authentication tools ────────────────────────────────────────

    /// Explains how signing in works.
    #[allow(
        clippy::unused_self,
        clippy::unnecessary_wraps,
        reason = "tool handlers share one receiver and result type"
    )]
    #[tool(description = "Get instructions for signing in to Monarch Money")]
    fn setup_authentication(&self) -> ToolResult {
        Ok(CallToolResult::success(vec![Content::text(
            SETUP_INSTRUCTIONS,
        )]))
    }

    /// Reports whether a session token is stored.
    #[tool(description = "Check whether a Monarch Money session is stored")]
    #[allow(clippy::unnecessary_wraps, reason = "tool handlers share one result type")]
    fn check_auth_status(&self) -> ToolResult {
        let mut lines = vec![if self.session.vault().load().is_some() {
            "Authentication token found in secure keyring storage".to_owned()
        } else {
            "No authentication token found in keyring".to_owned()
        }];
        if let Some(email) = self.session.env_email() {
            lines.push(format!("Environment email: {email}"));
        }
        lines.push(String::new());
        lines.push(
            "Try get_accounts to test the connection; a sign-in page opens if the session is invalid."
                .to_owned(),
        );
        Ok(CallToolResult::success(vec![Content::text(
            lines.join("\n"),
        )]))
    }

    /// Reports whether the keyring returns a token, without revealing it.
    #[tool(description = "Debug loading the session token from the keyring")]
    #[allow(clippy::unnecessary_wraps, reason = "tool handlers share one result type")]
    fn debug_session_loading(&self) -> ToolResult {
        let text = self.session.vault().load().map_or_else(
            || "No token found in keyring. Call any Monarch tool to open the sign-in page.".to_owned(),
            |token| format!("Token found in keyring (length: {})", token.len()),
        );
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    // ── Read tools ──────────────────────────────────────────────────

    /// Lists all accounts.
    #[tool(description = "Get all financial accounts with balances and institutions")]
    async fn get_accounts(&self) -> ToolResult {
        let outcome = self
            .session
            .call(|api| async move {
                let payload = queries::accounts(api.as_ref()).await?;
                Ok(payload
                    .accounts
                    .iter()
                    .map(AccountResponse::from_account)
                    .collect::<Vec<_>>())
            })
            .await;
        reply("getting accounts", outcome)
    }

    /// Searches transactions.
    #[tool(
        description = "Get transactions with optional filters: date range (both start_date and end_date), account_id or account_ids, search text, category/tag IDs, and boolean flags"
    )]
    async fn get_transactions(&self, params: Parameters<GetTransactionsParams>) -> ToolResult {
        let Parameters(args) = params;
        let range = match date_range(args.start_date.as_deref(), args.end_date.as_deref()) {
            Ok(range) => range,
            Err(message) => return invalid(&message),
        };
        let account_ids = match (args.account_id, args.account_ids) {
            (Some(_), Some(_)) => {
                return invalid("Cannot use both account_id and account_ids. Use one or the other.");
            }
            (Some(single), None) => vec![single],
            (None, many) => many.unwrap_or_default(),
        };
        let flags: Vec<(&'static str, bool)> = [
            ("hasAttachments", args.has_attachments),
            ("hasNotes", args.has_notes),
            ("hideFromReports", args.hidden_from_reports),
            ("isSplit", args.is_split),
            ("isRecurring", args.is_recurring),
            ("syncedFromInstitution", args.synced_from_institution),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|flag| (name, flag)))
        .collect();
        let query = TransactionQuery {
            limit: args.limit,
            offset: args.offset,
            start_date: range.map(|(from, _)| from.to_string()),
            end_date: range.map(|(_, to)| to.to_string()),
            search: args.search,
            account_ids,
            category_ids: args.category_ids.unwrap_or_default(),
            tag_ids: args.tag_ids.unwrap_or_default(),
            flags,
        };
        let outcome = self
            .session
            .call(move |api| async move {
                let payload = queries::transactions(api.as_ref(), &query).await?;
                Ok(payload
                    .all_transactions
                    .results
                    .iter()
                    .map(TransactionResponse::from_transaction)
                    .collect::<Vec<_>>())
            })
            .await;
        reply("getting transactions", outcome)
    }

    /// Budget data; defaults to last month through next month.
    #[tool(
        description = "Get budgets by category. Optional start_date and end_date (both or neither); defaults to last month through next month"
    )]
    async fn get_budgets(&self, params: Parameters<DateRangeParams>) -> ToolResult {
        let (from, to) = match resolve_range(&params.0, budget_window) {
            Ok(range) => range,
            Err(message) => return invalid(&message),
        };
        let outcome = self
            .session
            .call(move |api| async move { queries::budgets(api.as_ref(), &from, &to).await })
            .await;
        reply("getting budgets", outcome)
    }

    /// Cashflow summary; defaults to the current month.
    #[tool(
        description = "Get income, expenses and savings for a period. Optional start_date and end_date (both or neither); defaults to the current month"
    )]
    async fn get_cashflow(&self, params: Parameters<DateRangeParams>) -> ToolResult {
        let (from, to) = match resolve_range(&params.0, current_month) {
            Ok(range) => range,
            Err(message) => return invalid(&message),
        };
        let outcome = self
            .session
            .call(move |api| async move { queries::cashflow(api.as_ref(), &from, &to).await })
            .await;
        reply("getting cashflow", outcome)
    }

    /// Holdings of an investment account.
    #[tool(description = "Get investment holdings of an account")]
    async fn get_account_holdings(&self, params: Parameters<AccountIdParams>) -> ToolResult {
        let Parameters(AccountIdParams { account_id }) = params;
        let outcome = self
            .session
            .call(move |api| async move { queries::holdings(api.as_ref(), &account_id).await })
            .await;
        reply("getting account holdings", outcome)
    }

    /// Lists transaction categories.
    #[tool(description = "Get all transaction categories and their groups")]
    async fn get_transaction_categories(&self) -> ToolResult {
        let outcome = self
            .session
            .call(|api| async move { queries::categories(api.as_ref()).await })
            .await;
        reply("getting transaction categories", outcome)
    }

    /// Lists transaction tags.
    #[tool(description = "Get all transaction tags with colors and usage counts")]
    async fn get_transaction_tags(&self) -> ToolResult {
        let outcome = self
            .session
            .call(|api| async move {
                let payload = queries::tags(api.as_ref()).await?;
                Ok(payload
                    .household_transaction_tags
                    .iter()
                    .map(TagResponse::from_tag)
                    .collect::<Vec<_>>())
            })
            .await;
        reply("getting transaction tags", outcome)
    }

    /// Asks every institution to resync its accounts.
    #[tool(description = "Request a refresh of all accounts from their institutions")]
    async fn refresh_accounts(&self) -> ToolResult {
        let outcome = self
            .session
            .call(|api| async move {
                let payload = queries::accounts(api.as_ref()).await?;
                let ids: Vec<String> = payload
                    .accounts
                    .into_iter()
                    .map(|account| account.id)
                    .collect();
                if ids.is_empty() {
                    return Ok(None);
                }
                queries::refresh_accounts(api.as_ref(), &ids).await.map(Some)
            })
            .await;
        match outcome {
            Ok(Some(result)) => json_result(&result),
            Ok(None) => invalid("No accounts found to refresh."),
            Err(err) => tool_failure("refreshing accounts", err),
        }
    }

    /// Lists category groups.
    #[tool(description = "Get all transaction category groups")]
    async fn get_transaction_category_groups(&self) -> ToolResult {
        let outcome = self
            .session
            .call(|api| async move { queries::category_groups(api.as_ref()).await })
            .await;
        reply("getting transaction category groups", outcome)
    }

    /// Full details of one transaction.
    #[tool(
        description = "Get full details of a transaction, including splits, attachments and goal. redirect_posted (default true) follows a pending transaction to its posted version"
    )]
    async fn get_transaction_details(
        &self,
        params: Parameters<TransactionDetailsParams>,
    ) -> ToolResult {
        let Parameters(TransactionDetailsParams {
            transaction_id,
            redirect_posted,
        }) = params;
        let outcome = self
            .session
            .call(move |api| async move {
                queries::transaction_details(api.as_ref(), &transaction_id, redirect_posted).await
            })
            .await;
        reply("getting transaction details", outcome)
    }

    /// Splits of one transaction.
    #[tool(description = "Get the splits of a transaction")]
    async fn get_transaction_splits(&self, params: Parameters<TransactionIdParams>) -> ToolResult {
        let Parameters(TransactionIdParams { transaction_id }) = params;
        let outcome = self
            .session
            .call(move |api| async move {
                queries::transaction_splits(api.as_ref(), &transaction_id).await
            })
            .await;
        reply("getting transaction splits", outcome)
    }

    /// Count, sum, average and extremes of all transactions.
    #[tool(
        description = "Get an aggregate transaction summary: count, sum, average, largest amount, income and expenses"
    )]
    async fn get_transactions_summary(&self) -> ToolResult {
        let outcome = self
            .session
            .call(|api| async move { queries::transactions_summary(api.as_ref()).await })
            .await;
        reply("getting transactions summary", outcome)
    }

    /// Recurring transactions; defaults to the current month.
    #[tool(
        description = "Get recurring transactions. Optional start_date and end_date (both or neither); defaults to the current month"
    )]
    async fn get_recurring_transactions(&self, params: Parameters<DateRangeParams>) -> ToolResult {
        let (from, to) = match resolve_range(&params.0, current_month) {
            Ok(range) => range,
            Err(message) => return invalid(&message),
        };
        let outcome = self
            .session
            .call(move |api| async move {
                queries::recurring_transactions(api.as_ref(), &from, &to).await
            })
            .await;
        reply("getting recurring transactions", outcome)
    }

    /// Subscription status.
    #[tool(description = "Get Monarch Money subscription status and details")]
    async fn get_subscription_details(&self) -> ToolResult {
        let outcome = self
            .session
            .call(|api| async move { queries::subscription(api.as_ref()).await })
            .await;
        reply("getting subscription details", outcome)
    }

    /// Connected institutions.
    #[tool(description = "Get connected financial institutions and their connection status")]
    async fn get_institutions(&self) -> ToolResult {
        let outcome = self
            .session
            .call(|api| async move { queries::institutions(api.as_ref()).await })
            .await;
        reply("getting institutions", outcome)
    }

    /// Income, expense and savings totals; defaults to the current month.
    #[tool(
        description = "Get a cashflow summary: income, expenses, savings and savings rate. Optional start_date and end_date (both or neither); defaults to the current month"
    )]
    async fn get_cashflow_summary(&self, params: Parameters<CashflowSummaryParams>) -> ToolResult {
        let Parameters(CashflowSummaryParams {
            limit,
            start_date,
            end_date,
        }) = params;
        let range = DateRangeParams {
            start_date,
            end_date,
        };
        let (from, to) = match resolve_range(&range, current_month) {
            Ok(bounds) => bounds,
            Err(message) => return invalid(&message),
        };
        let outcome = self
            .session
            .call(move |api| async move {
                queries::cashflow_summary(api.as_ref(), limit, &from, &to).await
            })
            .await;
        reply("getting cashflow summary", outcome)
    }

    /// Balance history of one account.
    #[tool(description = "Get historical balance snapshots of an account")]
    async fn get_account_history(&self, params: Parameters<AccountIdParams>) -> ToolResult {
        let Parameters(AccountIdParams { account_id }) = params;
        let outcome = self
            .session
            .call(move |api| async move { queries::account_history(api.as_ref(), &account_id).await })
            .await;
        reply("getting account history", outcome)
    }

    /// Daily balances of every account.
    #[tool(
        description = "Get the daily balance of every account since start_date (YYYY-MM-DD, default 31 days ago)"
    )]
    async fn get_recent_account_balances(
        &self,
        params: Parameters<RecentBalancesParams>,
    ) -> ToolResult {
        let start = match optional_date(params.0.start_date.as_deref()) {
            Ok(Some(date)) => Some(date),
            Ok(None) => today().checked_sub_days(Days::new(RECENT_BALANCE_DAYS)),
            Err(message) => return invalid(&message),
        };
        let Some(start_date) = start.as_ref().map(ToString::to_string) else {
            return invalid("Could not compute the default start date.");
        };
        let outcome = self
            .session
            .call(move |api| async move { queries::recent_balances(api.as_ref(), &start_date).await })
            .await;
        reply("getting recent account balances", outcome)
    }

    /// Net value per account type.
    #[tool(
        description = "Get net value snapshots grouped by account type. timeframe is 'month' or 'year'"
    )]
    async fn get_account_snapshots_by_type(
        &self,
        params: Parameters<SnapshotsByTypeParams>,
    ) -> ToolResult {
        let Parameters(SnapshotsByTypeParams {
            start_date,
            timeframe,
        }) = params;
        if !matches!(timeframe.as_str(), "month" | "year") {
            return invalid("timeframe must be 'month' or 'year'.");
        }
        if let Err(message) = parse_date(&start_date) {
            return invalid(&message);
        }
        let outcome = self
            .session
            .call(move |api| async move {
                queries::snapshots_by_account_type(api.as_ref(), &start_date, &timeframe).await
            })
            .await;
        reply("getting account snapshots by type", outcome)
    }

    /// Daily aggregate net value.
    #[tool(
        description = "Get the daily aggregate net value of all accounts, optionally bounded by start_date and end_date and limited to one account_type"
    )]
    async fn get_aggregate_snapshots(
        &self,
        params: Parameters<AggregateSnapshotsParams>,
    ) -> ToolResult {
        let filter = match snapshot_filter(params.0) {
            Ok(filter) => filter,
            Err(message) => return invalid(&message),
        };
        let outcome = self
            .session
            .call(move |api| async move { queries::aggregate_snapshots(api.as_ref(), &filter).await })
            .await;
        reply("getting aggregate snapshots", outcome)
    }

    /// Account types for manual accounts.
    #[tool(description = "Get the account types and subtypes available for manual accounts")]
    async fn get_account_type_options(&self) -> ToolResult {
        let outcome = self
            .session
            .call(|api| async move { queries::account_type_options(api.as_ref()).await })
            .await;
        reply("getting account type options", outcome)
    }

    /// Credit score history.
    #[tool(description = "Get credit score history")]
    async fn get_credit_history(&self) -> ToolResult {
        let outcome = self
            .session
            .call(|api| async move { queries::credit_history(api.as_ref()).await })
            .await;
        reply("getting credit history", outcome)
    }

    // ── Write tools ─────────────────────────────────────────────────

    /// Creates a manual transaction.
    #[tool(
        description = "Create a manual transaction. Amount is positive for income and negative for expenses"
    )]
    async fn create_transaction(&self, params: Parameters<CreateTransactionParams>) -> ToolResult {
        let Parameters(args) = params;
        if let Err(message) = parse_date(&args.date) {
            return invalid(&message);
        }
        let transaction = NewTransaction {
            account_id: args.account_id,
            amount: args.amount,
            merchant_name: args.merchant_name,
            category_id: args.category_id,
            date: args.date,
            notes: args.notes.unwrap_or_default(),
            update_balance: args.update_balance,
        };
        let outcome = self
            .session
            .call(move |api| async move {
                queries::create_transaction(api.as_ref(), &transaction).await
            })
            .await;
        reply("creating transaction", outcome)
    }

    /// Updates fields of a transaction.
    #[tool(description = "Update an existing transaction. Only the given fields change")]
    async fn update_transaction(&self, params: Parameters<UpdateTransactionParams>) -> ToolResult {
        let Parameters(args) = params;
        if let Some(Err(message)) = args.date.as_deref().map(parse_date) {
            return invalid(&message);
        }
        let update = TransactionUpdate {
            category_id: args.category_id,
            merchant_name: args.merchant_name,
            goal_id: args.goal_id,
            amount: args.amount,
            date: args.date,
            hide_from_reports: args.hide_from_reports,
            needs_review: args.needs_review,
            notes: args.notes,
        };
        if update.is_empty() {
            return invalid("At least one field to update is required.");
        }
        let transaction_id = args.transaction_id;
        let outcome = self
            .session
            .call(move |api| async move {
                queries::update_transaction(api.as_ref(), &transaction_id, &update).await
            })
            .await;
        reply("updating transaction", outcome)
    }

    /// Deletes a transaction.
    #[tool(description = "Delete a transaction by its ID")]
    async fn delete_transaction(&self, params: Parameters<TransactionIdParams>) -> ToolResult {
        let Parameters(TransactionIdParams { transaction_id }) = params;
        let outcome = self
            .session
            .call(move |api| async move {
                let _result = queries::delete_transaction(api.as_ref(), &transaction_id).await?;
                Ok(DeletedResponse::new(DeletedItem::TransactionId(
                    transaction_id,
                )))
            })
            .await;
        reply("deleting transaction", outcome)
    }

    /// Creates a tag.
    #[tool(description = "Create a transaction tag with a name and a hex color such as #19D2A5")]
    async fn create_transaction_tag(&self, params: Parameters<CreateTagParams>) -> ToolResult {
        let Parameters(CreateTagParams { name, color }) = params;
        let trimmed = name.trim().to_owned();
        if trimmed.is_empty() {
            return invalid("Tag name cannot be empty");
        }
        if !is_hex_color(&color) {
            return invalid("Invalid color format. Use hex RGB with # (e.g., '#19D2A5')");
        }
        let outcome = self
            .session
            .call(move |api| async move { queries::create_tag(api.as_ref(), &trimmed, &color).await })
            .await;
        reply("creating transaction tag", outcome)
    }

    /// Replaces the tags on a transaction.
    #[tool(
        description = "Set the tags on a transaction, replacing existing ones. An empty list removes all tags"
    )]
    async fn set_transaction_tags(&self, params: Parameters<SetTransactionTagsParams>) -> ToolResult {
        let Parameters(SetTransactionTagsParams {
            transaction_id,
            tag_ids,
        }) = params;
        let outcome = self
            .session
            .call(move |api| async move {
                queries::set_transaction_tags(api.as_ref(), &transaction_id, &tag_ids).await
            })
            .await;
        reply("setting transaction tags", outcome)
    }
    /// Deletes a tag.
    #[tool(description = "Delete a transaction tag by its ID")]
    async fn delete_transaction_tag(&self, params: Parameters<TagIdParams>) -> ToolResult {
        let Parameters(TagIdParams { tag_id }) = params;
        let outcome = self
            .session
            .call(move |api| async move {
                let _result = queries::delete_tag(api.as_ref(), &tag_id).await?;
                Ok(DeletedResponse::new(DeletedItem::TagId(tag_id)))
            })
            .await;
        reply("deleting transaction tag", outcome)
    }

    /// Replaces the splits of a transaction.
    #[tool(
        description = "Create, change or remove the splits of a transaction. Each split has merchantName, amount and categoryId; amounts must add up to the transaction amount. An empty list removes all splits"
    )]
    async fn update_transaction_splits(&self, params: Parameters<UpdateSplitsParams>) -> ToolResult {
        let Parameters(UpdateSplitsParams {
            transaction_id,
            split_data,
        }) = params;
        let splits: Vec<Split> = split_data
            .into_iter()
            .map(|split| Split {
                merchant_name: split.merchant_name,
                amount: split.amount,
                category_id: split.category_id,
                notes: split.notes,
            })
            .collect();
        let outcome = self
            .session
            .call(move |api| async move {
                queries::update_transaction_splits(api.as_ref(), &transaction_id, &splits).await
            })
            .await;
        reply("updating transaction splits", outcome)
    }

    /// Creates a category.
    #[tool(
        description = "Create a transaction category in a category group, with an optional emoji icon and budget rollover settings"
    )]
    async fn create_transaction_category(
        &self,
        params: Parameters<CreateCategoryParams>,
    ) -> ToolResult {
        let Parameters(args) = params;
        let name = args.name.trim().to_owned();
        if name.is_empty() {
            return invalid("Category name cannot be empty");
        }
        let rollover_month = match optional_date(args.rollover_start_month.as_deref())
            .and_then(|date| month_start(date.unwrap_or_else(today)))
        {
            Ok(month) => month,
            Err(message) => return invalid(&message),
        };
        let category = NewCategory {
            group_id: args.group_id,
            name,
            icon: args.icon,
            rollover_enabled: args.rollover_enabled,
            rollover_type: args.rollover_type,
            rollover_start_month: rollover_month.to_string(),
        };
        let outcome = self
            .session
            .call(move |api| async move { queries::create_category(api.as_ref(), &category).await })
            .await;
        reply("creating transaction category", outcome)
    }

    /// Deletes a category.
    #[tool(description = "Delete a transaction category by its ID")]
    async fn delete_transaction_category(&self, params: Parameters<CategoryIdParams>) -> ToolResult {
        let Parameters(CategoryIdParams { category_id }) = params;
        let outcome = self
            .session
            .call(move |api| async move {
                let result = queries::delete_category(api.as_ref(), &category_id).await?;
                Ok(DeletedResponse::with_result(
                    DeletedItem::CategoryId(category_id),
                    result,
                ))
            })
            .await;
        reply("deleting transaction category", outcome)
    }

    /// Sets a budget amount.
    #[tool(
        description = "Set the budget amount of a category or category group (exactly one). timeframe is 'month' or 'week'; start_date defaults to the current month"
    )]
    async fn set_budget_amount(&self, params: Parameters<SetBudgetAmountParams>) -> ToolResult {
        let Parameters(args) = params;
        let target = match budget_target(args.category_id, args.category_group_id) {
            Ok(target) => target,
            Err(message) => return invalid(&message),
        };
        if !matches!(args.timeframe.as_str(), "month" | "week") {
            return invalid("timeframe must be 'month' or 'week'.");
        }
        let start = match args.start_date.as_deref() {
            Some(value) => parse_date(value),
            None => month_start(today()),
        };
        let start_date = match start {
            Ok(date) => date.to_string(),
            Err(message) => return invalid(&message),
        };
        let budget = BudgetAmount {
            target,
            amount: args.amount,
            timeframe: args.timeframe,
            start_date,
            apply_to_future: args.apply_to_future,
        };
        let outcome = self
            .session
            .call(move |api| async move { queries::set_budget_amount(api.as_ref(), &budget).await })
            .await;
        reply("setting budget amount", outcome)
    }

    /// Creates a manual account.
    #[tool(
        description = "Create a manual account. Use get_account_type_options for valid account_type and account_sub_type values"
    )]
    async fn create_manual_account(
        &self,
        params: Parameters<CreateManualAccountParams>,
    ) -> ToolResult {
        let Parameters(args) = params;
        let name = args.account_name.trim().to_owned();
        if name.is_empty() {
            return invalid("Account name cannot be empty");
        }
        let account = NewAccount {
            name,
            account_type: args.account_type,
            sub_type: args.account_sub_type,
            include_in_net_worth: args.is_in_net_worth,
            balance: args.account_balance,
        };
        let outcome = self
            .session
            .call(move |api| async move {
                queries::create_manual_account(api.as_ref(), &account).await
            })
            .await;
        reply("creating manual account", outcome)
    }

    /// Updates an account.
    #[tool(description = "Update an account's name, balance, type or visibility. Only the given fields change")]
    async fn update_account(&self, params: Parameters<UpdateAccountParams>) -> ToolResult {
        let Parameters(args) = params;
        let update = match account_update(&args) {
            Ok(update) => update,
            Err(message) => return invalid(&message),
        };
        let account_id = args.account_id;
        let outcome = self
            .session
            .call(move |api| async move {
                queries::update_account(api.as_ref(), &account_id, &update).await
            })
            .await;
        reply("updating account", outcome)
    }

    /// Deletes an account.
    #[tool(description = "Delete an account. This cannot be undone")]
    async fn delete_account(&self, params: Parameters<AccountIdParams>) -> ToolResult {
        let Parameters(AccountIdParams { account_id }) = params;
        let outcome = self
            .session
            .call(move |api| async move {
                let result = queries::delete_account(api.as_ref(), &account_id).await?;
                Ok(DeletedResponse::with_result(
                    DeletedItem::AccountId(account_id),
                    result,
                ))
            })
            .await;
        reply("deleting account", outcome)
    }
}

#[tool_handler]
impl ServerHandler for MonarchMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Monarch Money personal finance MCP server. \
                 Query accounts, transactions, budgets, cashflow, holdings, \
                 recurring items, net worth history, categories and tags. \
                 If a call reports that authentication is needed, finish \
                 signing in on the page opened in the browser and retry."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
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
    extern crate alloc;

    use alloc::sync::Arc;
    use core::time::Duration;

    use chrono::NaiveDate;
    use rmcp::handler::server::wrapper::Parameters;
    use rmcp::model::CallToolResult;
    use serde_json::{Value, json};

    use super::{
        MonarchMcpServer, WRITE_TOOLS, budget_window, current_month, date_range, is_hex_color,
        snapshot_filter,
    };
    use crate::auth::guard::AuthFlowGuard;
    use crate::auth::orchestrator::AuthOrchestrator;
    use crate::auth::session::SessionManager;
    use crate::auth::vault::Vault;
    use crate::params::{
        AccountIdParams, AggregateSnapshotsParams, CreateTagParams, GetTransactionsParams,
        TagIdParams, TransactionIdParams, UpdateTransactionParams,
    };
    use crate::test_support::{MemoryStore, RecordingBrowser, Reply, ScriptedConnector};

    struct Harness {
        server: MonarchMcpServer,
        store: Arc<MemoryStore>,
        connector: ScriptedConnector,
    }

    fn harness(enable_write: bool) -> Harness {
        let store = Arc::new(MemoryStore::new());
        store.put_token("tok-good");
        let connector = ScriptedConnector::new();
        let vault = Vault::new(
            Arc::<MemoryStore>::clone(&store),
            Arc::new(connector.clone()),
            std::env::temp_dir().join("monarch-mcp-server-tests"),
        );
        let orchestrator = Arc::new(AuthOrchestrator::new(
            AuthFlowGuard::new(),
            vault.clone(),
            Arc::new(connector.clone()),
            Arc::new(RecordingBrowser::default()),
            false,
            Duration::from_secs(30),
        ));
        let session = SessionManager::new(vault, Arc::new(connector.clone()), orchestrator, None);
        Harness {
            server: MonarchMcpServer::new(session, enable_write),
            store,
            connector,
        }
    }

    fn text(result: &CallToolResult) -> String {
        result
            .content
            .first()
            .and_then(|content| content.as_text())
            .map(|content| content.text.clone())
            .expect("result should carry text")
    }

    fn error_body(result: &CallToolResult) -> Value {
        assert_eq!(result.is_error, Some(true));
        serde_json::from_str(&text(result)).expect("error body should be JSON")
    }

    fn transactions_params(value: Value) -> Parameters<GetTransactionsParams> {
        params(value)
    }

    fn params<T: serde::de::DeserializeOwned>(value: Value) -> Parameters<T> {
        Parameters(serde_json::from_value(value).expect("valid params"))
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn date_ranges_need_both_ends() {
        let err = date_range(Some("2024-01-01"), None).expect_err("half-open range");
        assert!(err.starts_with("Both start_date and end_date"));
        assert!(date_range(None, None).expect("empty range").is_none());
        assert!(date_range(Some("2024-02-01"), Some("2024-01-01")).is_err());
        assert!(date_range(Some("01/02/2024"), Some("2024-01-03")).is_err());
    }

    #[test]
    fn default_windows_cover_whole_months() {
        let (from, to) = budget_window(date("2024-01-15")).expect("window");
        assert_eq!(from, date("2023-12-01"));
        assert_eq!(to, date("2024-02-29"));
        let (start, end) = current_month(date("2023-02-10")).expect("month");
        assert_eq!(start, date("2023-02-01"));
        assert_eq!(end, date("2023-02-28"));
    }

    #[test]
    fn hex_colors_need_hash_and_six_digits() {
        assert!(is_hex_color("#19D2A5"));
        assert!(is_hex_color("#abcdef"));
        assert!(!is_hex_color("19D2A5"));
        assert!(!is_hex_color("#19D2A"));
        assert!(!is_hex_color("#19D2AZ"));
    }

    #[tokio::test]
    async fn half_open_range_is_rejected_without_a_call() {
        let h = harness(false);
        let result = h
            .server
            .get_transactions(transactions_params(json!({ "start_date": "2024-01-01" })))
            .await
            .expect("tool should answer");
        let body = error_body(&result);
        assert_eq!(
            body["error"],
            "Both start_date and end_date are required when filtering by date."
        );
        assert!(h.connector.graphql_operations().is_empty());
    }

    #[tokio::test]
    async fn conflicting_account_filters_are_rejected() {
        let h = harness(false);
        let result = h
            .server
            .get_transactions(transactions_params(json!({
                "account_id": "acc-1",
                "account_ids": ["acc-2"]
            })))
            .await
            .expect("tool should answer");
        let body = error_body(&result);
        assert_eq!(
            body["error"],
            "Cannot use both account_id and account_ids. Use one or the other."
        );
        assert!(h.connector.graphql_operations().is_empty());
    }

    #[tokio::test]
    async fn transactions_are_flattened() {
        let h = harness(false);
        h.connector.set_graphql(Reply::Data(json!({
            "allTransactions": {
                "totalCount": 1,
                "results": [{
                    "id": "tx-1",
                    "date": "2024-01-05",
                    "amount": -20.0,
                    "category": { "id": "c-1", "name": "Groceries" },
                    "account": { "id": "acc-1", "displayName": "Checking" }
                }]
            }
        })));
        let result = h
            .server
            .get_transactions(transactions_params(json!({ "account_id": "acc-1" })))
            .await
            .expect("tool should answer");
        assert_ne!(result.is_error, Some(true));
        let body: Value = serde_json::from_str(&text(&result)).expect("JSON list");
        assert_eq!(body[0]["category"], "Groceries");
        assert_eq!(body[0]["account"], "Checking");
        assert_eq!(h.connector.graphql_operations(), vec!["GetTransactionsList"]);
    }

    #[tokio::test]
    async fn server_faults_are_reported_with_the_operation() {
        let h = harness(false);
        h.connector
            .set_graphql(Reply::Http(500, Some("application/json")));
        let result = h.server.get_accounts().await.expect("tool should answer");
        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).starts_with("Error getting accounts: Monarch API returned HTTP 500"));
        assert_eq!(h.store.token().as_deref(), Some("tok-good"));
    }

    #[tokio::test]
    async fn query_errors_keep_the_session() {
        let h = harness(false);
        h.connector
            .set_graphql(Reply::Query("Something went wrong".to_owned()));
        let result = h
            .server
            .get_transaction_categories()
            .await
            .expect("tool should answer");
        assert_eq!(
            text(&result),
            "Error getting transaction categories: API query failed: Something went wrong"
        );
        assert_eq!(h.store.token().as_deref(), Some("tok-good"));
    }

    #[tokio::test]
    async fn expired_session_is_reported_and_cleared() {
        let h = harness(false);
        h.connector
            .set_graphql(Reply::Http(401, Some("application/json")));
        let result = h.server.get_accounts().await.expect("tool should answer");
        assert!(text(&result).starts_with("Error getting accounts: Your session has expired."));
        assert_eq!(h.store.token(), None);
    }

    #[tokio::test]
    async fn refresh_without_accounts_sends_no_mutation() {
        let h = harness(false);
        h.connector.set_graphql(Reply::Data(json!({ "accounts": [] })));
        let result = h.server.refresh_accounts().await.expect("tool should answer");
        let body = error_body(&result);
        assert_eq!(body["error"], "No accounts found to refresh.");
        assert_eq!(h.connector.graphql_operations(), vec!["GetAccounts"]);
    }

    #[tokio::test]
    async fn refresh_requests_every_account() {
        let h = harness(false);
        h.connector
            .set_graphql(Reply::Data(json!({ "accounts": [{ "id": "a1" }, { "id": "a2" }] })));
        let result = h.server.refresh_accounts().await.expect("tool should answer");
        assert_ne!(result.is_error, Some(true));
        assert_eq!(
            h.connector.graphql_operations(),
            vec!["GetAccounts", "Common_ForceRefreshAccountsMutation"]
        );
    }

    #[tokio::test]
    async fn tag_input_is_validated() {
        let h = harness(true);
        let blank = h
            .server
            .create_transaction_tag(Parameters(CreateTagParams {
                name: "  ".to_owned(),
                color: "#19D2A5".to_owned(),
            }))
            .await
            .expect("tool should answer");
        assert_eq!(error_body(&blank)["error"], "Tag name cannot be empty");

        let bad_color = h
            .server
            .create_transaction_tag(Parameters(CreateTagParams {
                name: "Trip".to_owned(),
                color: "green".to_owned(),
            }))
            .await
            .expect("tool should answer");
        assert_eq!(
            error_body(&bad_color)["error"],
            "Invalid color format. Use hex RGB with # (e.g., '#19D2A5')"
        );
        assert!(h.connector.graphql_operations().is_empty());
    }

    #[tokio::test]
    async fn delete_confirms_the_transaction() {
        let h = harness(true);
        h.connector.set_graphql(Reply::Data(json!({
            "deleteTransaction": { "deleted": true, "errors": null }
        })));
        let result = h
            .server
            .delete_transaction(Parameters(TransactionIdParams {
                transaction_id: "tx-7".to_owned(),
            }))
            .await
            .expect("tool should answer");
        let body: Value = serde_json::from_str(&text(&result)).expect("JSON body");
        assert_eq!(body, json!({ "deleted": true, "transaction_id": "tx-7" }));
        assert_eq!(
            h.connector.graphql_operations(),
            vec!["Common_DeleteTransactionMutation"]
        );
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let h = harness(true);
        let params: UpdateTransactionParams =
            serde_json::from_value(json!({ "transaction_id": "tx-1" })).expect("valid params");
        let result = h
            .server
            .update_transaction(Parameters(params))
            .await
            .expect("tool should answer");
        assert_eq!(
            error_body(&result)["error"],
            "At least one field to update is required."
        );
        assert!(h.connector.graphql_operations().is_empty());
    }

    #[test]
    fn auth_status_never_reveals_the_token() {
        let h = harness(false);
        let status = h.server.check_auth_status().expect("tool should answer");
        assert!(text(&status).starts_with("Authentication token found"));
        let debug = h.server.debug_session_loading().expect("tool should answer");
        let message = text(&debug);
        assert_eq!(message, "Token found in keyring (length: 8)");
        assert!(!message.contains("tok-good"));
    }

    #[test]
    fn write_tools_require_opt_in() {
        let read_only = harness(false).server.tool_router.list_all();
        assert!(
            WRITE_TOOLS
                .iter()
                .all(|name| read_only.iter().all(|tool| tool.name != *name))
        );
        assert!(read_only.iter().any(|tool| tool.name == "get_accounts"));

        let writable = harness(true).server.tool_router.list_all();
        assert!(
            WRITE_TOOLS
                .iter()
                .all(|name| writable.iter().any(|tool| tool.name == *name))
        );
        assert_eq!(writable.len(), 38);
        assert_eq!(read_only.len(), writable.len() - WRITE_TOOLS.len());
    }

    #[test]
    fn every_tool_is_registered() {
        let tools = harness(true).server.tool_router.list_all();
        for name in [
            "get_transaction_category_groups",
            "get_transaction_details",
            "get_transaction_splits",
            "get_transactions_summary",
            "get_recurring_transactions",
            "get_subscription_details",
            "get_institutions",
            "get_cashflow_summary",
            "get_account_history",
            "get_recent_account_balances",
            "get_account_snapshots_by_type",
            "get_aggregate_snapshots",
            "get_account_type_options",
            "get_credit_history",
            "delete_transaction_tag",
            "update_transaction_splits",
            "create_transaction_category",
            "delete_transaction_category",
            "set_budget_amount",
            "create_manual_account",
            "update_account",
            "delete_account",
        ] {
            assert!(
                tools.iter().any(|tool| tool.name == name),
                "{name} should be registered"
            );
        }
    }

    #[test]
    fn snapshot_bounds_are_each_optional() {
        let filter = snapshot_filter(AggregateSnapshotsParams {
            start_date: Some("2024-01-01".to_owned()),
            ..AggregateSnapshotsParams::default()
        })
        .expect("start only");
        assert_eq!(filter.start_date.as_deref(), Some("2024-01-01"));
        assert!(filter.end_date.is_none());
        let err = snapshot_filter(AggregateSnapshotsParams {
            start_date: Some("2024-03-01".to_owned()),
            end_date: Some("2024-01-01".to_owned()),
            account_type: None,
        })
        .expect_err("reversed bounds");
        assert_eq!(err, "start_date must not be after end_date.");
    }

    #[tokio::test]
    async fn snapshot_timeframe_must_be_month_or_year() {
        let h = harness(false);
        let result = h
            .server
            .get_account_snapshots_by_type(params(json!({
                "start_date": "2024-01-01",
                "timeframe": "week"
            })))
            .await
            .expect("tool should answer");
        assert_eq!(
            error_body(&result)["error"],
            "timeframe must be 'month' or 'year'."
        );
        assert!(h.connector.graphql_operations().is_empty());

        let ok = h
            .server
            .get_account_snapshots_by_type(params(json!({
                "start_date": "2024-01-01",
                "timeframe": "year"
            })))
            .await
            .expect("tool should answer");
        assert_ne!(ok.is_error, Some(true));
        assert_eq!(
            h.connector.last_variables(),
            Some(json!({ "startDate": "2024-01-01", "timeframe": "year" }))
        );
    }

    #[tokio::test]
    async fn recurring_transactions_need_both_dates() {
        let h = harness(false);
        let result = h
            .server
            .get_recurring_transactions(params(json!({ "end_date": "2024-01-31" })))
            .await
            .expect("tool should answer");
        assert_eq!(
            error_body(&result)["error"],
            "Both start_date and end_date are required when filtering by date."
        );
        assert!(h.connector.graphql_operations().is_empty());
    }

    #[tokio::test]
    async fn recent_balances_default_to_a_month_back() {
        let h = harness(false);
        let result = h
            .server
            .get_recent_account_balances(params(json!({})))
            .await
            .expect("tool should answer");
        assert_ne!(result.is_error, Some(true));
        let variables = h.connector.last_variables().expect("one call");
        let start = date(variables["startDate"].as_str().expect("start date"));
        assert!(start < chrono::Local::now().date_naive());
        assert_eq!(
            h.connector.graphql_operations(),
            vec!["GetAccountRecentBalances"]
        );
    }

    #[tokio::test]
    async fn budget_needs_exactly_one_target() {
        let h = harness(true);
        for body in [
            json!({ "amount": 100.0 }),
            json!({ "amount": 100.0, "category_id": "cat-1", "category_group_id": "grp-1" }),
        ] {
            let result = h
                .server
                .set_budget_amount(params(body))
                .await
                .expect("tool should answer");
            assert_eq!(
                error_body(&result)["error"],
                "Provide exactly one of category_id or category_group_id."
            );
        }
        let bad_timeframe = h
            .server
            .set_budget_amount(params(json!({
                "amount": 100.0,
                "category_id": "cat-1",
                "timeframe": "year"
            })))
            .await
            .expect("tool should answer");
        assert_eq!(
            error_body(&bad_timeframe)["error"],
            "timeframe must be 'month' or 'week'."
        );
        assert!(h.connector.graphql_operations().is_empty());
    }

    #[tokio::test]
    async fn budget_for_a_group_is_sent_with_its_period() {
        let h = harness(true);
        let result = h
            .server
            .set_budget_amount(params(json!({
                "amount": 412.349,
                "category_group_id": "grp-1",
                "start_date": "2024-05-01",
                "apply_to_future": true
            })))
            .await
            .expect("tool should answer");
        assert_ne!(result.is_error, Some(true));
        let variables = h.connector.last_variables().expect("one call");
        assert_eq!(
            variables["input"],
            json!({
                "startDate": "2024-05-01",
                "timeframe": "month",
                "categoryId": null,
                "categoryGroupId": "grp-1",
                "amount": 412.35,
                "applyToFuture": true
            })
        );
    }

    #[tokio::test]
    async fn account_update_checks_its_fields() {
        let h = harness(true);
        let empty = h
            .server
            .update_account(params(json!({ "account_id": "acc-1" })))
            .await
            .expect("tool should answer");
        assert_eq!(
            error_body(&empty)["error"],
            "At least one field to update is required."
        );
        let blank = h
            .server
            .update_account(params(json!({ "account_id": "acc-1", "account_name": "  " })))
            .await
            .expect("tool should answer");
        assert_eq!(error_body(&blank)["error"], "Account name cannot be empty");
        assert!(h.connector.graphql_operations().is_empty());

        let result = h
            .server
            .update_account(params(json!({
                "account_id": "acc-1",
                "account_name": " Savings ",
                "hide_from_summary_list": true
            })))
            .await
            .expect("tool should answer");
        assert_ne!(result.is_error, Some(true));
        assert_eq!(
            h.connector.last_variables(),
            Some(json!({ "input": { "id": "acc-1", "name": "Savings", "hideFromList": true } }))
        );
    }

    #[tokio::test]
    async fn blank_names_are_rejected_for_new_accounts_and_categories() {
        let h = harness(true);
        let account = h
            .server
            .create_manual_account(params(json!({
                "account_name": "",
                "account_type": "depository",
                "account_sub_type": "checking",
                "is_in_net_worth": true
            })))
            .await
            .expect("tool should answer");
        assert_eq!(error_body(&account)["error"], "Account name cannot be empty");
        let category = h
            .server
            .create_transaction_category(params(json!({ "group_id": "grp-1", "name": " " })))
            .await
            .expect("tool should answer");
        assert_eq!(
            error_body(&category)["error"],
            "Category name cannot be empty"
        );
        assert!(h.connector.graphql_operations().is_empty());
    }

    #[tokio::test]
    async fn category_rollover_starts_on_the_first_of_the_month() {
        let h = harness(true);
        let result = h
            .server
            .create_transaction_category(params(json!({
                "group_id": "grp-1",
                "name": "Pets",
                "rollover_enabled": true,
                "rollover_start_month": "2024-07-19"
            })))
            .await
            .expect("tool should answer");
        assert_ne!(result.is_error, Some(true));
        let variables = h.connector.last_variables().expect("one call");
        assert_eq!(variables["input"]["rolloverStartMonth"], "2024-07-01");
        assert_eq!(variables["input"]["group"], "grp-1");
        assert_eq!(h.connector.graphql_operations(), vec!["Web_CreateCategory"]);
    }

    #[tokio::test]
    async fn deletions_confirm_what_was_removed() {
        let h = harness(true);
        let tag = h
            .server
            .delete_transaction_tag(Parameters(TagIdParams {
                tag_id: "tag-3".to_owned(),
            }))
            .await
            .expect("tool should answer");
        let body: Value = serde_json::from_str(&text(&tag)).expect("JSON body");
        assert_eq!(body, json!({ "deleted": true, "tag_id": "tag-3" }));

        h.connector.set_graphql(Reply::Data(json!({
            "deleteAccount": { "deleted": true, "errors": null }
        })));
        let account = h
            .server
            .delete_account(Parameters(AccountIdParams {
                account_id: "acc-9".to_owned(),
            }))
            .await
            .expect("tool should answer");
        let body: Value = serde_json::from_str(&text(&account)).expect("JSON body");
        assert_eq!(
            body,
            json!({
                "deleted": true,
                "account_id": "acc-9",
                "result": { "deleted": true, "errors": null }
            })
        );
        assert_eq!(
            h.connector.graphql_operations(),
            vec!["Common_DeleteTransactionTag", "Common_DeleteAccount"]
        );
    }

    #[tokio::test]
    async fn splits_are_sent_with_api_field_names() {
        let h = harness(true);
        let result = h
            .server
            .update_transaction_splits(params(json!({
                "transaction_id": "tx-1",
                "split_data": [
                    { "merchantName": "Store", "amount": -30.004, "categoryId": "cat-1" }
                ]
            })))
            .await
            .expect("tool should answer");
        assert_ne!(result.is_error, Some(true));
        assert_eq!(
            h.connector.last_variables(),
            Some(json!({
                "input": {
                    "transactionId": "tx-1",
                    "splitData": [
                        { "merchantName": "Store", "amount": -30.0, "categoryId": "cat-1" }
                    ]
                }
            }))
        );
    }

    #[tokio::test]
    async fn new_read_tools_report_failures_with_their_operation() {
        let h = harness(false);
        h.connector
            .set_graphql(Reply::Query("Credit data unavailable".to_owned()));
        let result = h.server.get_credit_history().await.expect("tool should answer");
        assert_eq!(
            text(&result),
            "Error getting credit history: API query failed: Credit data unavailable"
        );
        let details = h
            .server
            .get_transaction_details(params(json!({ "transaction_id": "tx-1" })))
            .await
            .expect("tool should answer");
        assert!(text(&details).starts_with("Error getting transaction details:"));
        assert_eq!(
            h.connector.last_variables(),
            Some(json!({ "id": "tx-1", "redirectPosted": true }))
        );
    }
}
