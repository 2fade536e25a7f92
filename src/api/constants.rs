//! API constants and endpoint builders

/// Default service root, API version included
pub const DEFAULT_BASE_URL: &str = "https://api.ynab.com/v1";

/// Query parameter carrying the delta-sync cursor
pub const SERVER_KNOWLEDGE_PARAM: &str = "last_knowledge_of_server";

/// Response field carrying the delta-sync cursor
pub const SERVER_KNOWLEDGE_FIELD: &str = "server_knowledge";

/// Standard headers
pub mod headers {
    pub const CONTENT_TYPE_JSON: &str = "application/json";

    pub const X_CORRELATION_ID: &str = "X-Correlation-ID";

    pub const RETRY_AFTER: &str = "Retry-After";

    pub const USER_AGENT: &str = concat!("budget-client/", env!("CARGO_PKG_VERSION"));
}

/// Response keys of each resource collection
pub mod keys {
    pub const BUDGETS: &str = "budgets";
    pub const ACCOUNTS: &str = "accounts";
    pub const ACCOUNT: &str = "account";
    pub const CATEGORY_GROUPS: &str = "category_groups";
    pub const CATEGORY: &str = "category";
    pub const PAYEES: &str = "payees";
    pub const PAYEE: &str = "payee";
    pub const TRANSACTIONS: &str = "transactions";
    pub const TRANSACTION: &str = "transaction";
    pub const SCHEDULED_TRANSACTIONS: &str = "scheduled_transactions";
    pub const MONTHS: &str = "months";
    pub const MONTH: &str = "month";
    pub const USER: &str = "user";
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// `/budgets/{budget_id}/{collection}`
pub fn budget_collection(budget_id: &str, collection: &str) -> String {
    format!("/budgets/{}/{}", segment(budget_id), collection)
}

/// `/budgets/{budget_id}/{collection}/{id}`
pub fn budget_entity(budget_id: &str, collection: &str, id: &str) -> String {
    format!("/budgets/{}/{}/{}", segment(budget_id), collection, segment(id))
}

/// `/budgets/{budget_id}/{scope}/{scope_id}/transactions`
pub fn scoped_transactions(budget_id: &str, scope: &str, scope_id: &str) -> String {
    format!(
        "/budgets/{}/{}/{}/transactions",
        segment(budget_id),
        scope,
        segment(scope_id)
    )
}

/// Join a base URL and an API path without doubling slashes
pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
