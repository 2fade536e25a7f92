//! Per-resource methods on [`BudgetClient`]
//!
//! Each method shapes one request and hands it to the dispatcher. List methods
//! accept an optional `since` cursor and return a [`Delta`].

use super::client::BudgetClient;
use super::constants::{self, keys};
use super::error::{ApiError, ApiErrorKind};
use super::models::{Milliunits, Record};
use super::sync::{Delta, ServerKnowledge};
use reqwest::Method;
use serde_json::{Value, json};

/// Which slice of a budget's transactions to list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TransactionScope {
    #[default]
    Budget,
    Account(String),
    Category(String),
    Payee(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Uncategorized,
    Unapproved,
}

impl TransactionType {
    fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Uncategorized => "uncategorized",
            TransactionType::Unapproved => "unapproved",
        }
    }
}

/// Filters for [`BudgetClient::list_transactions`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub scope: TransactionScope,
    /// ISO date (`YYYY-MM-DD`); only transactions on or after it
    pub since_date: Option<String>,
    pub transaction_type: Option<TransactionType>,
}

impl TransactionFilter {
    pub fn account(account_id: impl Into<String>) -> Self {
        Self {
            scope: TransactionScope::Account(account_id.into()),
            ..Self::default()
        }
    }

    pub fn since_date(mut self, date: impl Into<String>) -> Self {
        self.since_date = Some(date.into());
        self
    }

    pub fn of_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = Some(transaction_type);
        self
    }

    fn path(&self, budget_id: &str) -> String {
        match &self.scope {
            TransactionScope::Budget => constants::budget_collection(budget_id, keys::TRANSACTIONS),
            TransactionScope::Account(id) => constants::scoped_transactions(budget_id, "accounts", id),
            TransactionScope::Category(id) => constants::scoped_transactions(budget_id, "categories", id),
            TransactionScope::Payee(id) => constants::scoped_transactions(budget_id, "payees", id),
        }
    }

    fn query(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(date) = &self.since_date {
            params.push(("since_date".to_string(), date.clone()));
        }
        if let Some(kind) = self.transaction_type {
            params.push(("type".to_string(), kind.as_str().to_string()));
        }
        params
    }
}

/// Attach naming guidance to a conflict without changing its kind
fn duplicate_name_hint(error: ApiError, what: &str) -> ApiError {
    if error.kind() == ApiErrorKind::ConflictError {
        error.with_remediation(format!(
            "another {} may already use this name; choose a different name or reuse the existing one",
            what
        ))
    } else {
        error
    }
}

impl BudgetClient {
    // Budgets

    pub async fn list_budgets(&self) -> Result<Vec<Record>, ApiError> {
        self.get_list("/budgets", keys::BUDGETS).await
    }

    // Accounts

    pub async fn list_accounts(&self, budget_id: &str, since: Option<ServerKnowledge>) -> Result<Delta<Record>, ApiError> {
        let path = constants::budget_collection(budget_id, keys::ACCOUNTS);
        self.get_delta(path, keys::ACCOUNTS, since, Vec::new()).await
    }

    pub async fn get_account(&self, budget_id: &str, account_id: &str) -> Result<Record, ApiError> {
        let path = constants::budget_entity(budget_id, keys::ACCOUNTS, account_id);
        self.get_entity(&path, keys::ACCOUNTS, keys::ACCOUNT).await
    }

    /// Create an account. `account_type` is the service's type name, e.g. `checking`.
    pub async fn create_account(
        &self,
        budget_id: &str,
        name: &str,
        account_type: &str,
        balance: Milliunits,
    ) -> Result<Record, ApiError> {
        let body = json!({
            "account": {
                "name": name,
                "type": account_type,
                "balance": balance
            }
        });
        self.write_entity(
            Method::POST,
            constants::budget_collection(budget_id, keys::ACCOUNTS),
            keys::ACCOUNTS,
            keys::ACCOUNT,
            Some(body),
        )
        .await
        .map_err(|e| duplicate_name_hint(e, "account"))
    }

    // Categories

    /// Category groups with their nested `categories`
    pub async fn list_categories(&self, budget_id: &str, since: Option<ServerKnowledge>) -> Result<Delta<Record>, ApiError> {
        let path = constants::budget_collection(budget_id, "categories");
        self.get_delta(path, keys::CATEGORY_GROUPS, since, Vec::new()).await
    }

    pub async fn get_category(&self, budget_id: &str, category_id: &str) -> Result<Record, ApiError> {
        let path = constants::budget_entity(budget_id, "categories", category_id);
        self.get_entity(&path, keys::CATEGORY_GROUPS, keys::CATEGORY).await
    }

    // Payees

    pub async fn list_payees(&self, budget_id: &str, since: Option<ServerKnowledge>) -> Result<Delta<Record>, ApiError> {
        let path = constants::budget_collection(budget_id, keys::PAYEES);
        self.get_delta(path, keys::PAYEES, since, Vec::new()).await
    }

    pub async fn get_payee(&self, budget_id: &str, payee_id: &str) -> Result<Record, ApiError> {
        let path = constants::budget_entity(budget_id, keys::PAYEES, payee_id);
        self.get_entity(&path, keys::PAYEES, keys::PAYEE).await
    }

    pub async fn rename_payee(&self, budget_id: &str, payee_id: &str, name: &str) -> Result<Record, ApiError> {
        self.write_entity(
            Method::PATCH,
            constants::budget_entity(budget_id, keys::PAYEES, payee_id),
            keys::PAYEES,
            keys::PAYEE,
            Some(json!({ "payee": { "name": name } })),
        )
        .await
        .map_err(|e| duplicate_name_hint(e, "payee"))
    }

    // Transactions

    pub async fn list_transactions(
        &self,
        budget_id: &str,
        filter: &TransactionFilter,
        since: Option<ServerKnowledge>,
    ) -> Result<Delta<Record>, ApiError> {
        self.get_delta(filter.path(budget_id), keys::TRANSACTIONS, since, filter.query())
            .await
    }

    pub async fn get_transaction(&self, budget_id: &str, transaction_id: &str) -> Result<Record, ApiError> {
        let path = constants::budget_entity(budget_id, keys::TRANSACTIONS, transaction_id);
        self.get_entity(&path, keys::TRANSACTIONS, keys::TRANSACTION).await
    }

    /// Create a transaction from its JSON representation (amount in milliunits)
    pub async fn create_transaction(&self, budget_id: &str, transaction: Value) -> Result<Record, ApiError> {
        self.write_entity(
            Method::POST,
            constants::budget_collection(budget_id, keys::TRANSACTIONS),
            keys::TRANSACTIONS,
            keys::TRANSACTION,
            Some(json!({ "transaction": transaction })),
        )
        .await
    }

    pub async fn update_transaction(
        &self,
        budget_id: &str,
        transaction_id: &str,
        changes: Value,
    ) -> Result<Record, ApiError> {
        self.write_entity(
            Method::PUT,
            constants::budget_entity(budget_id, keys::TRANSACTIONS, transaction_id),
            keys::TRANSACTIONS,
            keys::TRANSACTION,
            Some(json!({ "transaction": changes })),
        )
        .await
    }

    /// Delete a transaction; the returned record is its tombstone
    pub async fn delete_transaction(&self, budget_id: &str, transaction_id: &str) -> Result<Record, ApiError> {
        self.write_entity(
            Method::DELETE,
            constants::budget_entity(budget_id, keys::TRANSACTIONS, transaction_id),
            keys::TRANSACTIONS,
            keys::TRANSACTION,
            None,
        )
        .await
    }

    // Scheduled transactions

    pub async fn list_scheduled_transactions(
        &self,
        budget_id: &str,
        since: Option<ServerKnowledge>,
    ) -> Result<Delta<Record>, ApiError> {
        let path = constants::budget_collection(budget_id, keys::SCHEDULED_TRANSACTIONS);
        self.get_delta(path, keys::SCHEDULED_TRANSACTIONS, since, Vec::new())
            .await
    }

    // Months

    pub async fn list_months(&self, budget_id: &str, since: Option<ServerKnowledge>) -> Result<Delta<Record>, ApiError> {
        let path = constants::budget_collection(budget_id, keys::MONTHS);
        self.get_delta(path, keys::MONTHS, since, Vec::new()).await
    }

    /// A single budget month, `month` as `YYYY-MM-01` or `current`
    pub async fn get_month(&self, budget_id: &str, month: &str) -> Result<Record, ApiError> {
        let path = constants::budget_entity(budget_id, keys::MONTHS, month);
        self.get_entity(&path, keys::MONTHS, keys::MONTH).await
    }
}
