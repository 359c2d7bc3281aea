//! GraphQL operations forwarded by the MCP tools.
//!
//! Each function issues one operation through a [`MonarchApi`]. Lists that
//! tools reshape for display are decoded into typed payloads; everything
//! else is handed back as raw JSON.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::monarch::client::MonarchApi;
use crate::monarch::error::ApiError;

/// Account list, also used as the cheap token validation call.
const GET_ACCOUNTS: &str = "\
query GetAccounts {
  accounts {
    id
    displayName
    currentBalance
    isActive
    deactivatedAt
    type { name display }
    institution { id name }
  }
}";

/// Paged transaction search.
const GET_TRANSACTIONS: &str = "\
query GetTransactionsList($offset: Int, $limit: Int, $filters: TransactionFilterInput, $orderBy: TransactionOrdering) {
  allTransactions(filters: $filters) {
    totalCount
    results(offset: $offset, limit: $limit, orderBy: $orderBy) {
      id
      amount
      pending
      date
      plaidName
      notes
      isRecurring
      category { id name }
      merchant { id name }
      account { id displayName }
      tags { id name color order }
    }
  }
}";

/// Budget amounts per category and month.
const GET_BUDGETS: &str = "\
query Common_GetJointPlanningData($startDate: Date!, $endDate: Date!) {
  budgetData(startMonth: $startDate, endMonth: $endDate) {
    monthlyAmountsByCategory {
      category { id name }
      monthlyAmounts { month plannedCashFlowAmount actualAmount remainingAmount }
    }
  }
  categoryGroups { id name type }
}";

/// Cashflow aggregates for a date range.
const GET_CASHFLOW: &str = "\
query Web_GetCashFlowPage($filters: TransactionFilterInput) {
  byCategory: aggregates(filters: $filters, groupBy: [\"category\"]) {
    groupBy { category { id name group { id type } } }
    summary { sum }
  }
  summary: aggregates(filters: $filters, fillEmptyValues: true) {
    summary { sumIncome sumExpense savings savingsRate }
  }
}";

/// Investment holdings of one account.
const GET_HOLDINGS: &str = "\
query Web_GetHoldings($input: PortfolioInput) {
  portfolio(input: $input) {
    aggregateHoldings {
      edges {
        node {
          id
          quantity
          basis
          totalValue
          holdings { id name ticker closingPrice }
        }
      }
    }
  }
}";

/// Transaction categories.
const GET_CATEGORIES: &str = "\
query GetCategories {
  categories {
    id
    order
    name
    isSystemCategory
    group { id name type }
  }
}";

/// Household transaction tags.
const GET_TAGS: &str = "\
query GetHouseholdTransactionTags {
  householdTransactionTags { id name color order transactionCount }
}";

/// Asks institutions to resync accounts.
const REFRESH_ACCOUNTS: &str = "\
mutation Common_ForceRefreshAccountsMutation($input: ForceRefreshAccountsInput!) {
  forceRefreshAccounts(input: $input) {
    success
    errors { message }
  }
}";

/// Creates a manual transaction.
const CREATE_TRANSACTION: &str = "\
mutation Common_CreateTransactionMutation($input: CreateTransactionMutationInput!) {
  createTransaction(input: $input) {
    errors { message }
    transaction { id }
  }
}";

/// Updates fields of a transaction.
const UPDATE_TRANSACTION: &str = "\
mutation Web_TransactionDrawerUpdateTransaction($input: UpdateTransactionMutationInput!) {
  updateTransaction(input: $input) {
    transaction {
      id
      amount
      pending
      date
      hideFromReports
      needsReview
      notes
      category { id name }
      merchant { id name }
    }
    errors { message }
  }
}";

/// Deletes a transaction.
const DELETE_TRANSACTION: &str = "\
mutation Common_DeleteTransactionMutation($input: DeleteTransactionMutationInput!) {
  deleteTransaction(input: $input) {
    deleted
    errors { message }
  }
}";

/// Creates a transaction tag.
const CREATE_TAG: &str = "\
mutation Common_CreateTransactionTag($input: CreateTransactionTagInput!) {
  createTransactionTag(input: $input) {
    tag { id name color order transactionCount }
    errors { message }
  }
}";

/// Replaces the tags of a transaction.
const SET_TRANSACTION_TAGS: &str = "\
mutation Web_SetTransactionTags($input: SetTransactionTagsInput!) {
  setTransactionTags(input: $input) {
    errors { message }
    transaction { id tags { id } }
  }
}";

/// Removes a transaction tag.
const DELETE_TAG: &str = "\
mutation Common_DeleteTransactionTag($tagId: ID!) {
  deleteTransactionTag(tagId: $tagId) {
    __typename
  }
}";

/// Category groups.
const GET_CATEGORY_GROUPS: &str = "\
query ManageGetCategoryGroups {
  categoryGroups { id name order type updatedAt createdAt }
}";

/// Creates a category inside a group.
const CREATE_CATEGORY: &str = "\
mutation Web_CreateCategory($input: CreateCategoryInput!) {
  createCategory(input: $input) {
    errors { message }
    category { id name icon order group { id name type } }
  }
}";

/// Deletes a category.
const DELETE_CATEGORY: &str = "\
mutation Web_DeleteCategory($id: UUID!, $moveToCategoryId: UUID) {
  deleteCategory(id: $id, moveToCategoryId: $moveToCategoryId) {
    errors { message }
    deleted
  }
}";

/// One transaction with everything the drawer shows.
const GET_TRANSACTION_DETAILS: &str = "\
query GetTransactionDrawer($id: UUID!, $redirectPosted: Boolean) {
  getTransaction(id: $id, redirectPosted: $redirectPosted) {
    id
    amount
    pending
    isRecurring
    date
    originalDate
    hideFromReports
    needsReview
    reviewedAt
    plaidName
    notes
    hasSplitTransactions
    isSplitTransaction
    isManual
    splitTransactions { id amount notes merchant { id name } category { id name } }
    originalTransaction { id date amount merchant { id name } }
    attachments { id filename originalAssetUrl }
    account { id displayName }
    category { id name }
    goal { id name }
    merchant { id name transactionCount }
    tags { id name color order }
  }
}";

/// Splits of one transaction.
const GET_TRANSACTION_SPLITS: &str = "\
query TransactionSplitQuery($id: UUID!) {
  getTransaction(id: $id) {
    id
    amount
    category { id name }
    merchant { id name }
    splitTransactions { id amount notes merchant { id name } category { id name } }
  }
}";

/// Replaces the splits of a transaction.
const UPDATE_TRANSACTION_SPLITS: &str = "\
mutation Common_SplitTransactionMutation($input: UpdateTransactionSplitMutationInput!) {
  updateTransactionSplit(input: $input) {
    errors { message }
    transaction {
      id
      hasSplitTransactions
      splitTransactions { id amount notes merchant { id name } category { id name } }
    }
  }
}";

/// Aggregates over all transactions.
const GET_TRANSACTIONS_SUMMARY: &str = "\
query GetTransactionsPage($filters: TransactionFilterInput) {
  aggregates(filters: $filters) {
    summary { avg count max maxExpense sum sumIncome sumExpense first last }
  }
}";

/// Upcoming and past recurring transaction items.
const GET_RECURRING: &str = "\
query Web_GetUpcomingRecurringTransactionItems($startDate: Date!, $endDate: Date!, $filters: RecurringTransactionFilter) {
  recurringTransactionItems(startDate: $startDate, endDate: $endDate, filters: $filters) {
    stream { id frequency amount isApproximate merchant { id name } }
    date
    isPast
    transactionId
    amount
    amountDiff
    category { id name }
    account { id displayName }
  }
}";

/// Monarch Money subscription status.
const GET_SUBSCRIPTION: &str = "\
query GetSubscriptionDetails {
  subscription { id paymentSource referralCode isOnFreeTrial hasPremiumEntitlement }
}";

/// Income, expense and savings totals.
const GET_CASHFLOW_SUMMARY: &str = "\
query Web_GetCashFlowPage($filters: TransactionFilterInput) {
  summary: aggregates(filters: $filters, fillEmptyValues: true) {
    summary { sumIncome sumExpense savings savingsRate }
  }
}";

/// Sets the planned amount of a category or group.
const SET_BUDGET_AMOUNT: &str = "\
mutation Common_UpdateBudgetItem($input: UpdateOrCreateBudgetItemMutationInput!) {
  updateOrCreateBudgetItem(input: $input) {
    budgetItem { id budgetAmount }
  }
}";

/// Creates an account that is not linked to an institution.
const CREATE_MANUAL_ACCOUNT: &str = "\
mutation Web_CreateManualAccount($input: CreateManualAccountMutationInput!) {
  createManualAccount(input: $input) {
    account { id }
    errors { message }
  }
}";

/// Updates account settings and balance.
const UPDATE_ACCOUNT: &str = "\
mutation Common_UpdateAccount($input: UpdateAccountMutationInput!) {
  updateAccount(input: $input) {
    account {
      id
      displayName
      currentBalance
      includeInNetWorth
      hideFromList
      hideTransactionsFromReports
      type { name display }
      subtype { name display }
    }
    errors { message }
  }
}";

/// Deletes an account.
const DELETE_ACCOUNT: &str = "\
mutation Common_DeleteAccount($id: UUID!) {
  deleteAccount(id: $id) {
    deleted
    errors { message }
  }
}";

/// Account types and subtypes accepted for manual accounts.
const GET_ACCOUNT_TYPE_OPTIONS: &str = "\
query GetAccountTypeOptions {
  accountTypeOptions {
    type { name display group possibleSubtypes { name display } }
    subtype { name display }
  }
}";

/// Balance history of one account.
const GET_ACCOUNT_HISTORY: &str = "\
query AccountDetails_getAccount($id: UUID!) {
  account(id: $id) {
    id
    displayName
    type { name display }
    subtype { name display }
    institution { id name }
  }
  snapshots: snapshotsForAccount(accountId: $id) { date signedBalance }
}";

/// Daily balances of every account since a date.
const GET_RECENT_BALANCES: &str = "\
query GetAccountRecentBalances($startDate: Date!) {
  accounts { id recentBalances(startDate: $startDate) }
}";

/// Net value per account type and period.
const GET_SNAPSHOTS_BY_TYPE: &str = "\
query GetSnapshotsByAccountType($startDate: Date!, $timeframe: Timeframe!) {
  snapshotsByAccountType(startDate: $startDate, timeframe: $timeframe) {
    accountType
    month
    balance
  }
  accountTypes { name group }
}";

/// Daily net value of all accounts.
const GET_AGGREGATE_SNAPSHOTS: &str = "\
query GetAggregateSnapshots($filters: AggregateSnapshotFilters) {
  aggregateSnapshots(filters: $filters) { date balance }
}";

/// Connected institutions and their sync state.
const GET_INSTITUTIONS: &str = "\
query Web_GetInstitutionSettings {
  credentials {
    id
    displayLastUpdatedAt
    dataProvider
    updateRequired
    disconnectedFromDataProviderAt
    institution { id name status url }
  }
  accounts(filters: { includeDeleted: true }) {
    id
    displayName
    mask
    deletedAt
    subtype { display }
    credential { id }
  }
  subscription { isOnFreeTrial hasPremiumEntitlement }
}";

/// Credit score snapshots.
const GET_CREDIT_HISTORY: &str = "\
query Common_GetSpinwheelCreditScoreSnapshots {
  spinwheelUser {
    id
    creditScoreSnapshots { reportedDate score }
  }
}";

/// An `{ id, name }` reference; only the name is kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct NamedRef {
    /// Display name.
    #[serde(default)]
    pub(crate) name: Option<String>,
}

/// Account as returned by `GetAccounts`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawAccount {
    /// Account ID.
    pub(crate) id: String,
    /// Display name.
    #[serde(default)]
    pub(crate) display_name: Option<String>,
    /// Current balance.
    #[serde(default)]
    pub(crate) current_balance: Option<f64>,
    /// Active flag (absent on older API versions).
    #[serde(default)]
    pub(crate) is_active: Option<bool>,
    /// Deactivation timestamp.
    #[serde(default)]
    pub(crate) deactivated_at: Option<String>,
    /// Account type.
    #[serde(default, rename = "type")]
    pub(crate) kind: Option<NamedRef>,
    /// Institution holding the account.
    #[serde(default)]
    pub(crate) institution: Option<NamedRef>,
}

/// `GetAccounts` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AccountsPayload {
    /// All accounts.
    #[serde(default)]
    pub(crate) accounts: Vec<RawAccount>,
}

/// Account reference inside a transaction.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountRef {
    /// Display name.
    #[serde(default)]
    pub(crate) display_name: Option<String>,
}

/// Tag as returned by the tag list and inside transactions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawTag {
    /// Tag ID.
    pub(crate) id: String,
    /// Tag name.
    #[serde(default)]
    pub(crate) name: Option<String>,
    /// Hex color.
    #[serde(default)]
    pub(crate) color: Option<String>,
    /// Sort order.
    #[serde(default)]
    pub(crate) order: Option<i64>,
    /// Number of tagged transactions (tag list only).
    #[serde(default)]
    pub(crate) transaction_count: Option<i64>,
}

/// Transaction as returned by `GetTransactionsList`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawTransaction {
    /// Transaction ID.
    pub(crate) id: String,
    /// Posting date.
    #[serde(default)]
    pub(crate) date: Option<String>,
    /// Signed amount.
    #[serde(default)]
    pub(crate) amount: Option<f64>,
    /// Statement description from the institution.
    #[serde(default)]
    pub(crate) plaid_name: Option<String>,
    /// User notes.
    #[serde(default)]
    pub(crate) notes: Option<String>,
    /// Whether the transaction is still pending.
    #[serde(default)]
    pub(crate) pending: bool,
    /// Whether the transaction is recurring.
    #[serde(default)]
    pub(crate) is_recurring: bool,
    /// Category.
    #[serde(default)]
    pub(crate) category: Option<NamedRef>,
    /// Merchant.
    #[serde(default)]
    pub(crate) merchant: Option<NamedRef>,
    /// Account.
    #[serde(default)]
    pub(crate) account: Option<AccountRef>,
    /// Tags.
    #[serde(default)]
    pub(crate) tags: Vec<RawTag>,
}

/// Result page of `allTransactions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct TransactionPage {
    /// This page.
    #[serde(default)]
    pub(crate) results: Vec<RawTransaction>,
}

/// `GetTransactionsList` payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransactionsPayload {
    /// Search results.
    #[serde(default)]
    pub(crate) all_transactions: TransactionPage,
}

/// `GetHouseholdTransactionTags` payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TagsPayload {
    /// All tags.
    #[serde(default)]
    pub(crate) household_transaction_tags: Vec<RawTag>,
}

/// Filters for the transaction search, already validated by the caller.
#[derive(Debug, Clone, Default)]
pub(crate) struct TransactionQuery {
    /// Page size.
    pub(crate) limit: u32,
    /// Page offset.
    pub(crate) offset: u32,
    /// Inclusive start date, `YYYY-MM-DD`.
    pub(crate) start_date: Option<String>,
    /// Inclusive end date, `YYYY-MM-DD`.
    pub(crate) end_date: Option<String>,
    /// Free-text search.
    pub(crate) search: Option<String>,
    /// Account IDs.
    pub(crate) account_ids: Vec<String>,
    /// Category IDs.
    pub(crate) category_ids: Vec<String>,
    /// Tag IDs.
    pub(crate) tag_ids: Vec<String>,
    /// Boolean filters keyed by their GraphQL field name.
    pub(crate) flags: Vec<(&'static str, bool)>,
}

impl TransactionQuery {
    /// Renders the `TransactionFilterInput` object.
    fn filters(&self) -> Value {
        let mut filters = Map::new();
        let _search = filters.insert(
            "search".to_owned(),
            Value::String(self.search.clone().unwrap_or_default()),
        );
        let _categories = filters.insert("categories".to_owned(), json!(self.category_ids));
        let _accounts = filters.insert("accounts".to_owned(), json!(self.account_ids));
        let _tags = filters.insert("tags".to_owned(), json!(self.tag_ids));
        if let Some(start) = self.start_date.as_ref() {
            let _start = filters.insert("startDate".to_owned(), json!(start));
        }
        if let Some(end) = self.end_date.as_ref() {
            let _end = filters.insert("endDate".to_owned(), json!(end));
        }
        for &(name, value) in &self.flags {
            let _flag = filters.insert(name.to_owned(), Value::Bool(value));
        }
        Value::Object(filters)
    }
}

/// Fields to change on a transaction; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub(crate) struct TransactionUpdate {
    /// New category ID.
    pub(crate) category_id: Option<String>,
    /// New merchant name.
    pub(crate) merchant_name: Option<String>,
    /// Goal to associate.
    pub(crate) goal_id: Option<String>,
    /// New amount.
    pub(crate) amount: Option<f64>,
    /// New date, `YYYY-MM-DD`.
    pub(crate) date: Option<String>,
    /// Hide from reports.
    pub(crate) hide_from_reports: Option<bool>,
    /// Needs-review flag.
    pub(crate) needs_review: Option<bool>,
    /// Notes.
    pub(crate) notes: Option<String>,
}

impl TransactionUpdate {
    /// Whether no field would change.
    pub(crate) const fn is_empty(&self) -> bool {
        self.category_id.is_none()
            && self.merchant_name.is_none()
            && self.goal_id.is_none()
            && self.amount.is_none()
            && self.date.is_none()
            && self.hide_from_reports.is_none()
            && self.needs_review.is_none()
            && self.notes.is_none()
    }
}

/// New manual transaction.
#[derive(Debug, Clone)]
pub(crate) struct NewTransaction {
    /// Account to post to.
    pub(crate) account_id: String,
    /// Signed amount.
    pub(crate) amount: f64,
    /// Merchant name.
    pub(crate) merchant_name: String,
    /// Category ID.
    pub(crate) category_id: String,
    /// Date, `YYYY-MM-DD`.
    pub(crate) date: String,
    /// Notes.
    pub(crate) notes: String,
    /// Whether to adjust the account balance.
    pub(crate) update_balance: bool,
}

/// What a budget amount applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BudgetTarget {
    /// A single category.
    Category(String),
    /// A whole category group.
    Group(String),
}

/// Planned amount for one budget period.
#[derive(Debug, Clone)]
pub(crate) struct BudgetAmount {
    /// Category or group.
    pub(crate) target: BudgetTarget,
    /// Planned amount.
    pub(crate) amount: f64,
    /// Budget period, e.g. `month`.
    pub(crate) timeframe: String,
    /// First day of the period, `YYYY-MM-DD`.
    pub(crate) start_date: String,
    /// Whether later periods take the same amount.
    pub(crate) apply_to_future: bool,
}

/// One part of a split transaction, in the API's field names.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Split {
    /// Merchant shown on the split.
    pub(crate) merchant_name: String,
    /// Part of the original amount.
    pub(crate) amount: f64,
    /// Category of the split.
    pub(crate) category_id: String,
    /// Notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) notes: Option<String>,
}

/// New category.
#[derive(Debug, Clone)]
pub(crate) struct NewCategory {
    /// Group the category belongs to.
    pub(crate) group_id: String,
    /// Name.
    pub(crate) name: String,
    /// Emoji icon.
    pub(crate) icon: String,
    /// Whether unspent budget rolls over.
    pub(crate) rollover_enabled: bool,
    /// Rollover period.
    pub(crate) rollover_type: String,
    /// First month of rollover, `YYYY-MM-01`.
    pub(crate) rollover_start_month: String,
}

/// New manual account.
#[derive(Debug, Clone)]
pub(crate) struct NewAccount {
    /// Display name.
    pub(crate) name: String,
    /// Account type name from `accountTypeOptions`.
    pub(crate) account_type: String,
    /// Subtype name.
    pub(crate) sub_type: String,
    /// Whether the balance counts toward net worth.
    pub(crate) include_in_net_worth: bool,
    /// Opening balance.
    pub(crate) balance: f64,
}

/// Account fields to change; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub(crate) struct AccountUpdate {
    /// New display name.
    pub(crate) name: Option<String>,
    /// New balance.
    pub(crate) balance: Option<f64>,
    /// New type.
    pub(crate) account_type: Option<String>,
    /// New subtype.
    pub(crate) sub_type: Option<String>,
    /// Whether the balance counts toward net worth.
    pub(crate) include_in_net_worth: Option<bool>,
    /// Hide from the account list.
    pub(crate) hide_from_list: Option<bool>,
    /// Hide the account's transactions from reports.
    pub(crate) hide_transactions_from_reports: Option<bool>,
}

impl AccountUpdate {
    /// Whether no field would change.
    pub(crate) const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.balance.is_none()
            && self.account_type.is_none()
            && self.sub_type.is_none()
            && self.include_in_net_worth.is_none()
            && self.hide_from_list.is_none()
            && self.hide_transactions_from_reports.is_none()
    }

    /// Renders the `UpdateAccountMutationInput` object.
    fn input(&self, account_id: &str) -> Value {
        let mut input = Map::new();
        let _id = input.insert("id".to_owned(), json!(account_id));
        let fields = [
            ("name", self.name.as_ref().map(|name| json!(name))),
            ("displayBalance", self.balance.map(|balance| json!(round_cents(balance)))),
            ("type", self.account_type.as_ref().map(|kind| json!(kind))),
            ("subtype", self.sub_type.as_ref().map(|kind| json!(kind))),
            ("includeInNetWorth", self.include_in_net_worth.map(Value::Bool)),
            ("hideFromList", self.hide_from_list.map(Value::Bool)),
            (
                "hideTransactionsFromReports",
                self.hide_transactions_from_reports.map(Value::Bool),
            ),
        ];
        for (name, value) in fields {
            if let Some(field) = value {
                let _previous = input.insert(name.to_owned(), field);
            }
        }
        Value::Object(input)
    }
}

/// Optional bounds for the aggregate net value series.
#[derive(Debug, Clone, Default)]
pub(crate) struct SnapshotFilter {
    /// First day, `YYYY-MM-DD`.
    pub(crate) start_date: Option<String>,
    /// Last day, `YYYY-MM-DD`.
    pub(crate) end_date: Option<String>,
    /// Account type name.
    pub(crate) account_type: Option<String>,
}

/// Runs `query` and decodes its data into `T`.
async fn fetch<T: DeserializeOwned>(
    api: &dyn MonarchApi,
    operation: &'static str,
    query: &'static str,
    variables: Value,
) -> Result<T, ApiError> {
    let data = api.graphql(operation, query, variables).await?;
    serde_json::from_value(data).map_err(|err| ApiError::Decode(format!("{operation}: {err}")))
}

/// Lists all accounts.
pub(crate) async fn accounts(api: &dyn MonarchApi) -> Result<AccountsPayload, ApiError> {
    fetch(api, "GetAccounts", GET_ACCOUNTS, json!({})).await
}

/// Searches transactions.
pub(crate) async fn transactions(
    api: &dyn MonarchApi,
    query: &TransactionQuery,
) -> Result<TransactionsPayload, ApiError> {
    let variables = json!({
        "offset": query.offset,
        "limit": query.limit,
        "orderBy": "date",
        "filters": query.filters(),
    });
    fetch(api, "GetTransactionsList", GET_TRANSACTIONS, variables).await
}

/// Budget data between two dates.
pub(crate) async fn budgets(
    api: &dyn MonarchApi,
    start_date: &str,
    end_date: &str,
) -> Result<Value, ApiError> {
    let variables = json!({ "startDate": start_date, "endDate": end_date });
    api.graphql("Common_GetJointPlanningData", GET_BUDGETS, variables)
        .await
}

/// Cashflow aggregates between two dates.
pub(crate) async fn cashflow(
    api: &dyn MonarchApi,
    start_date: &str,
    end_date: &str,
) -> Result<Value, ApiError> {
    let variables = json!({
        "filters": {
            "search": "",
            "categories": [],
            "accounts": [],
            "tags": [],
            "startDate": start_date,
            "endDate": end_date,
        }
    });
    api.graphql("Web_GetCashFlowPage", GET_CASHFLOW, variables)
        .await
}

/// Holdings of an investment account.
pub(crate) async fn holdings(api: &dyn MonarchApi, account_id: &str) -> Result<Value, ApiError> {
    let variables = json!({
        "input": {
            "accountIds": [account_id],
            "includeHiddenHoldings": true,
        }
    });
    api.graphql("Web_GetHoldings", GET_HOLDINGS, variables).await
}

/// Lists transaction categories.
pub(crate) async fn categories(api: &dyn MonarchApi) -> Result<Value, ApiError> {
    api.graphql("GetCategories", GET_CATEGORIES, json!({})).await
}

/// Lists transaction tags.
pub(crate) async fn tags(api: &dyn MonarchApi) -> Result<TagsPayload, ApiError> {
    fetch(api, "GetHouseholdTransactionTags", GET_TAGS, json!({})).await
}

/// Requests a refresh of the given accounts.
pub(crate) async fn refresh_accounts(
    api: &dyn MonarchApi,
    account_ids: &[String],
) -> Result<Value, ApiError> {
    let variables = json!({ "input": { "accountIds": account_ids } });
    api.graphql("Common_ForceRefreshAccountsMutation", REFRESH_ACCOUNTS, variables)
        .await
}

/// Creates a manual transaction.
pub(crate) async fn create_transaction(
    api: &dyn MonarchApi,
    transaction: &NewTransaction,
) -> Result<Value, ApiError> {
    let variables = json!({
        "input": {
            "date": transaction.date,
            "accountId": transaction.account_id,
            "amount": round_cents(transaction.amount),
            "merchantName": transaction.merchant_name,
            "categoryId": transaction.category_id,
            "notes": transaction.notes,
            "shouldUpdateBalance": transaction.update_balance,
        }
    });
    api.graphql("Common_CreateTransactionMutation", CREATE_TRANSACTION, variables)
        .await
}

/// Updates a transaction.
pub(crate) async fn update_transaction(
    api: &dyn MonarchApi,
    transaction_id: &str,
    update: &TransactionUpdate,
) -> Result<Value, ApiError> {
    let mut input = Map::new();
    let _id = input.insert("id".to_owned(), json!(transaction_id));
    if let Some(category) = update.category_id.as_ref() {
        let _category = input.insert("category".to_owned(), json!(category));
    }
    if let Some(merchant) = update.merchant_name.as_ref() {
        let _merchant = input.insert("name".to_owned(), json!(merchant));
    }
    if let Some(goal) = update.goal_id.as_ref() {
        let _goal = input.insert("goalId".to_owned(), json!(goal));
    }
    if let Some(amount) = update.amount {
        let _amount = input.insert("amount".to_owned(), json!(round_cents(amount)));
    }
    if let Some(date) = update.date.as_ref() {
        let _date = input.insert("date".to_owned(), json!(date));
    }
    if let Some(hide) = update.hide_from_reports {
        let _hide = input.insert("hideFromReports".to_owned(), json!(hide));
    }
    if let Some(review) = update.needs_review {
        let _review = input.insert("needsReview".to_owned(), json!(review));
    }
    if let Some(notes) = update.notes.as_ref() {
        let _notes = input.insert("notes".to_owned(), json!(notes));
    }
    let variables = json!({ "input": Value::Object(input) });
    api.graphql(
        "Web_TransactionDrawerUpdateTransaction",
        UPDATE_TRANSACTION,
        variables,
    )
    .await
}

/// Deletes a transaction.
pub(crate) async fn delete_transaction(
    api: &dyn MonarchApi,
    transaction_id: &str,
) -> Result<Value, ApiError> {
    let variables = json!({ "input": { "transactionId": transaction_id } });
    api.graphql("Common_DeleteTransactionMutation", DELETE_TRANSACTION, variables)
        .await
}

/// Creates a transaction tag.
pub(crate) async fn create_tag(
    api: &dyn MonarchApi,
    name: &str,
    color: &str,
) -> Result<Value, ApiError> {
    let variables = json!({ "input": { "name": name, "color": color } });
    api.graphql("Common_CreateTransactionTag", CREATE_TAG, variables)
        .await
}

/// Replaces the tags on a transaction; an empty list removes all tags.
pub(crate) async fn set_transaction_tags(
    api: &dyn MonarchApi,
    transaction_id: &str,
    tag_ids: &[String],
) -> Result<Value, ApiError> {
    let variables = json!({ "input": { "transactionId": transaction_id, "tagIds": tag_ids } });
    api.graphql("Web_SetTransactionTags", SET_TRANSACTION_TAGS, variables)
        .await
}

/// Deletes a transaction tag.
pub(crate) async fn delete_tag(api: &dyn MonarchApi, tag_id: &str) -> Result<Value, ApiError> {
    api.graphql("Common_DeleteTransactionTag", DELETE_TAG, json!({ "tagId": tag_id }))
        .await
}

/// Lists category groups.
pub(crate) async fn category_groups(api: &dyn MonarchApi) -> Result<Value, ApiError> {
    api.graphql("ManageGetCategoryGroups", GET_CATEGORY_GROUPS, json!({}))
        .await
}

/// Creates a category.
pub(crate) async fn create_category(
    api: &dyn MonarchApi,
    category: &NewCategory,
) -> Result<Value, ApiError> {
    let variables = json!({
        "input": {
            "group": category.group_id,
            "name": category.name,
            "icon": category.icon,
            "rolloverEnabled": category.rollover_enabled,
            "rolloverType": category.rollover_type,
            "rolloverStartMonth": category.rollover_start_month,
        }
    });
    api.graphql("Web_CreateCategory", CREATE_CATEGORY, variables)
        .await
}

/// Deletes a category; its transactions become uncategorized.
pub(crate) async fn delete_category(
    api: &dyn MonarchApi,
    category_id: &str,
) -> Result<Value, ApiError> {
    let variables = json!({ "id": category_id, "moveToCategoryId": null });
    let data = api
        .graphql("Web_DeleteCategory", DELETE_CATEGORY, variables)
        .await?;
    Ok(payload_field(data, "deleteCategory"))
}

/// Full details of one transaction.
pub(crate) async fn transaction_details(
    api: &dyn MonarchApi,
    transaction_id: &str,
    redirect_posted: bool,
) -> Result<Value, ApiError> {
    let variables = json!({ "id": transaction_id, "redirectPosted": redirect_posted });
    api.graphql("GetTransactionDrawer", GET_TRANSACTION_DETAILS, variables)
        .await
}

/// Splits of one transaction.
pub(crate) async fn transaction_splits(
    api: &dyn MonarchApi,
    transaction_id: &str,
) -> Result<Value, ApiError> {
    api.graphql(
        "TransactionSplitQuery",
        GET_TRANSACTION_SPLITS,
        json!({ "id": transaction_id }),
    )
    .await
}

/// Replaces the splits of a transaction; an empty list removes them.
pub(crate) async fn update_transaction_splits(
    api: &dyn MonarchApi,
    transaction_id: &str,
    splits: &[Split],
) -> Result<Value, ApiError> {
    let split_data: Vec<Split> = splits
        .iter()
        .map(|split| Split {
            amount: round_cents(split.amount),
            ..split.clone()
        })
        .collect();
    let variables = json!({
        "input": { "transactionId": transaction_id, "splitData": split_data }
    });
    api.graphql(
        "Common_SplitTransactionMutation",
        UPDATE_TRANSACTION_SPLITS,
        variables,
    )
    .await
}

/// Count, sum, average and extremes over all transactions.
pub(crate) async fn transactions_summary(api: &dyn MonarchApi) -> Result<Value, ApiError> {
    api.graphql(
        "GetTransactionsPage",
        GET_TRANSACTIONS_SUMMARY,
        json!({ "filters": {} }),
    )
    .await
}

/// Recurring transaction items between two dates.
pub(crate) async fn recurring_transactions(
    api: &dyn MonarchApi,
    start_date: &str,
    end_date: &str,
) -> Result<Value, ApiError> {
    let variables = json!({ "startDate": start_date, "endDate": end_date, "filters": {} });
    api.graphql(
        "Web_GetUpcomingRecurringTransactionItems",
        GET_RECURRING,
        variables,
    )
    .await
}

/// Subscription status of the signed-in household.
pub(crate) async fn subscription(api: &dyn MonarchApi) -> Result<Value, ApiError> {
    api.graphql("GetSubscriptionDetails", GET_SUBSCRIPTION, json!({}))
        .await
}

/// Income, expenses, savings and savings rate between two dates.
pub(crate) async fn cashflow_summary(
    api: &dyn MonarchApi,
    limit: u32,
    start_date: &str,
    end_date: &str,
) -> Result<Value, ApiError> {
    let variables = json!({
        "limit": limit,
        "filters": {
            "search": "",
            "categories": [],
            "accounts": [],
            "tags": [],
            "startDate": start_date,
            "endDate": end_date,
        }
    });
    api.graphql("Web_GetCashFlowPage", GET_CASHFLOW_SUMMARY, variables)
        .await
}

/// Sets a budget amount.
pub(crate) async fn set_budget_amount(
    api: &dyn MonarchApi,
    budget: &BudgetAmount,
) -> Result<Value, ApiError> {
    let (category_id, group_id) = match budget.target.clone() {
        BudgetTarget::Category(id) => (Some(id), None),
        BudgetTarget::Group(id) => (None, Some(id)),
    };
    let variables = json!({
        "input": {
            "startDate": budget.start_date,
            "timeframe": budget.timeframe,
            "categoryId": category_id,
            "categoryGroupId": group_id,
            "amount": round_cents(budget.amount),
            "applyToFuture": budget.apply_to_future,
        }
    });
    api.graphql("Common_UpdateBudgetItem", SET_BUDGET_AMOUNT, variables)
        .await
}

/// Creates a manual account.
pub(crate) async fn create_manual_account(
    api: &dyn MonarchApi,
    account: &NewAccount,
) -> Result<Value, ApiError> {
    let variables = json!({
        "input": {
            "type": account.account_type,
            "subtype": account.sub_type,
            "includeInNetWorth": account.include_in_net_worth,
            "name": account.name,
            "displayBalance": round_cents(account.balance),
        }
    });
    api.graphql("Web_CreateManualAccount", CREATE_MANUAL_ACCOUNT, variables)
        .await
}

/// Updates an account.
pub(crate) async fn update_account(
    api: &dyn MonarchApi,
    account_id: &str,
    update: &AccountUpdate,
) -> Result<Value, ApiError> {
    let variables = json!({ "input": update.input(account_id) });
    api.graphql("Common_UpdateAccount", UPDATE_ACCOUNT, variables)
        .await
}

/// Deletes an account.
pub(crate) async fn delete_account(
    api: &dyn MonarchApi,
    account_id: &str,
) -> Result<Value, ApiError> {
    let data = api
        .graphql("Common_DeleteAccount", DELETE_ACCOUNT, json!({ "id": account_id }))
        .await?;
    Ok(payload_field(data, "deleteAccount"))
}

/// Account types usable for manual accounts.
pub(crate) async fn account_type_options(api: &dyn MonarchApi) -> Result<Value, ApiError> {
    api.graphql("GetAccountTypeOptions", GET_ACCOUNT_TYPE_OPTIONS, json!({}))
        .await
}

/// Balance snapshots of one account.
pub(crate) async fn account_history(
    api: &dyn MonarchApi,
    account_id: &str,
) -> Result<Value, ApiError> {
    api.graphql(
        "AccountDetails_getAccount",
        GET_ACCOUNT_HISTORY,
        json!({ "id": account_id }),
    )
    .await
}

/// Daily balance of every account since `start_date`.
pub(crate) async fn recent_balances(
    api: &dyn MonarchApi,
    start_date: &str,
) -> Result<Value, ApiError> {
    api.graphql(
        "GetAccountRecentBalances",
        GET_RECENT_BALANCES,
        json!({ "startDate": start_date }),
    )
    .await
}

/// Net value per account type, by `month` or `year`.
pub(crate) async fn snapshots_by_account_type(
    api: &dyn MonarchApi,
    start_date: &str,
    timeframe: &str,
) -> Result<Value, ApiError> {
    let variables = json!({ "startDate": start_date, "timeframe": timeframe });
    api.graphql("GetSnapshotsByAccountType", GET_SNAPSHOTS_BY_TYPE, variables)
        .await
}

/// Daily aggregate net value.
pub(crate) async fn aggregate_snapshots(
    api: &dyn MonarchApi,
    filter: &SnapshotFilter,
) -> Result<Value, ApiError> {
    let variables = json!({
        "filters": {
            "startDate": filter.start_date,
            "endDate": filter.end_date,
            "accountType": filter.account_type,
        }
    });
    api.graphql("GetAggregateSnapshots", GET_AGGREGATE_SNAPSHOTS, variables)
        .await
}

/// Institutions with their connection state.
pub(crate) async fn institutions(api: &dyn MonarchApi) -> Result<Value, ApiError> {
    api.graphql("Web_GetInstitutionSettings", GET_INSTITUTIONS, json!({}))
        .await
}

/// Credit score history.
pub(crate) async fn credit_history(api: &dyn MonarchApi) -> Result<Value, ApiError> {
    api.graphql(
        "Common_GetSpinwheelCreditScoreSnapshots",
        GET_CREDIT_HISTORY,
        json!({}),
    )
    .await
}

/// Takes the payload object of a single-field mutation, or `null`.
fn payload_field(mut data: Value, field: &str) -> Value {
    data.get_mut(field).map_or(Value::Null, Value::take)
}

/// Rounds an amount to cents, as the web client does.
fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
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
        AccountUpdate, TransactionQuery, TransactionUpdate, delete_category, payload_field,
        round_cents, transactions,
    };
    use crate::test_support::{Reply, ScriptedConnector};

    #[test]
    fn filters_include_only_requested_dates_and_flags() {
        let query = TransactionQuery {
            limit: 10,
            offset: 0,
            start_date: Some("2024-01-01".to_owned()),
            end_date: Some("2024-01-31".to_owned()),
            account_ids: vec!["acc-1".to_owned()],
            flags: vec![("hasNotes", true)],
            ..TransactionQuery::default()
        };
        let filters = query.filters();
        assert_eq!(filters["startDate"], "2024-01-01");
        assert_eq!(filters["endDate"], "2024-01-31");
        assert_eq!(filters["accounts"], json!(["acc-1"]));
        assert_eq!(filters["hasNotes"], true);
        assert_eq!(filters["search"], "");
        assert!(filters.get("isSplit").is_none());
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(TransactionUpdate::default().is_empty());
        let update = TransactionUpdate {
            notes: Some(String::new()),
            ..TransactionUpdate::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn amounts_round_to_cents() {
        assert!((round_cents(12.345_6) - 12.35).abs() < f64::EPSILON);
        assert!((round_cents(-3.001) + 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn transaction_page_decodes() {
        let connector = ScriptedConnector::new();
        connector.set_graphql(Reply::Data(json!({
            "allTransactions": {
                "totalCount": 1,
                "results": [{
                    "id": "tx-1",
                    "date": "2024-03-02",
                    "amount": -12.5,
                    "merchant": { "id": "m-1", "name": "Cafe" },
                    "tags": [{ "id": "t-1", "name": "Coffee", "color": "#aa0000" }]
                }]
            }
        })));
        let api = connector.api();
        let payload = transactions(api.as_ref(), &TransactionQuery::default())
            .await
            .expect("page should decode");
        let page = payload.all_transactions;
        let first = page.results.first().expect("one transaction");
        assert_eq!(first.id, "tx-1");
        assert!(!first.pending);
        assert_eq!(first.tags.len(), 1);
        assert_eq!(connector.graphql_operations(), vec!["GetTransactionsList"]);
    }

    #[test]
    fn account_update_sends_only_changed_fields() {
        let update = AccountUpdate {
            balance: Some(1_000.456),
            include_in_net_worth: Some(false),
            ..AccountUpdate::default()
        };
        assert!(!update.is_empty());
        assert_eq!(
            update.input("acc-1"),
            json!({ "id": "acc-1", "displayBalance": 1_000.46, "includeInNetWorth": false })
        );
        assert!(AccountUpdate::default().is_empty());
    }

    #[test]
    fn missing_mutation_payload_is_null() {
        let data = json!({ "deleteAccount": { "deleted": true } });
        assert_eq!(payload_field(data, "deleteAccount"), json!({ "deleted": true }));
        assert_eq!(payload_field(json!({}), "deleteAccount"), json!(null));
    }

    #[tokio::test]
    async fn category_deletion_returns_its_payload() {
        let connector = ScriptedConnector::new();
        connector.set_graphql(Reply::Data(json!({
            "deleteCategory": { "deleted": true, "errors": null }
        })));
        let api = connector.api();
        let result = delete_category(api.as_ref(), "cat-1")
            .await
            .expect("deletion should succeed");
        assert_eq!(result, json!({ "deleted": true, "errors": null }));
        assert_eq!(
            connector.last_variables(),
            Some(json!({ "id": "cat-1", "moveToCategoryId": null }))
        );
    }
}
