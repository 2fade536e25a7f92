//! Keeping a local copy of a budget's accounts in sync
//!
//! Reads the token from `BUDGET_API_TOKEN` (or `.env`) and the budget id from
//! the first argument. Does one full listing, then polls for deltas.

use budget_client::api::{DeltaCache, Record};
use budget_client::config::ClientConfig;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let budget_id = std::env::args().nth(1).unwrap_or_else(|| "last-used".to_string());
    let client = ClientConfig::load()?.build_client()?;

    let mut accounts: DeltaCache<Record> = DeltaCache::new();

    for round in 0..3 {
        let delta = client.list_accounts(&budget_id, accounts.cursor()).await?;
        let kind = if delta.is_full() { "full" } else { "delta" };
        let outcome = accounts.apply(delta);

        println!(
            "round {}: {} listing, {} upserted, {} removed, {} cached (cursor {:?})",
            round,
            kind,
            outcome.upserted,
            outcome.removed,
            accounts.len(),
            accounts.cursor()
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    for account in accounts.values() {
        let balance = account
            .milliunits("balance")
            .map(|b| b.to_string())
            .unwrap_or_default();
        println!("{:<30} {:>12}", account.name().unwrap_or("?"), balance);
    }

    let quota = client.quota();
    println!("\n{} requests left, window resets at {}", quota.remaining, quota.reset_at);

    Ok(())
}
