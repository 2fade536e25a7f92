use anyhow::{Context, Result, bail};
use budget_client::api::{BudgetClient, ServerKnowledge, TransactionFilter};
use budget_client::config::ClientConfig;
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;
use serde_json::json;

#[derive(Parser)]
#[command(name = "budget-client")]
#[command(about = "A quota-aware client for the budget Web API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe the service with the configured token
    Status,
    /// Show the local quota window
    Quota,
    /// Validate the configuration and report every problem
    CheckConfig,
    /// List budgets
    Budgets,
    /// List a budget's resources, optionally as a delta
    List {
        resource: Resource,
        /// Budget id, or `last-used`
        #[arg(long)]
        budget: String,
        /// Only return changes after this server_knowledge value
        #[arg(long)]
        since: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Resource {
    Accounts,
    Categories,
    Payees,
    Transactions,
    ScheduledTransactions,
    Months,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn client() -> Result<BudgetClient> {
    ClientConfig::load()?
        .build_client()
        .context("Failed to set up the budget client")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    info!("Starting budget-client");

    match cli.command {
        Commands::Status => {
            let health = client()?.status().await;
            print_json(&health)?;
        }
        Commands::Quota => {
            let client = client()?;
            print_json(&json!({
                "quota": client.quota(),
                "limiter": client.rate_limiter_stats(),
            }))?;
        }
        Commands::CheckConfig => {
            let config = ClientConfig::load()?;
            let issues = config.validate();
            if issues.is_empty() {
                println!("Configuration OK ({})", ClientConfig::get_config_path()?.display());
            } else {
                for issue in &issues {
                    eprintln!("  - {}", issue);
                }
                bail!("{} configuration problem(s)", issues.len());
            }
        }
        Commands::Budgets => {
            let budgets = client()?.list_budgets().await?;
            print_json(&budgets)?;
        }
        Commands::List {
            resource,
            budget,
            since,
        } => {
            let client = client()?;
            let since = since.map(ServerKnowledge);
            let delta = match resource {
                Resource::Accounts => client.list_accounts(&budget, since).await?,
                Resource::Categories => client.list_categories(&budget, since).await?,
                Resource::Payees => client.list_payees(&budget, since).await?,
                Resource::Transactions => {
                    client
                        .list_transactions(&budget, &TransactionFilter::default(), since)
                        .await?
                }
                Resource::ScheduledTransactions => client.list_scheduled_transactions(&budget, since).await?,
                Resource::Months => client.list_months(&budget, since).await?,
            };
            print_json(&delta)?;
        }
    }

    Ok(())
}
