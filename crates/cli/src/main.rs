//! heraldctl - admin client for the Herald daemon
//!
//! Talks JSON-RPC over HTTP to the daemon's localhost admin port.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9528";

#[derive(Parser)]
#[command(name = "heraldctl")]
#[command(about = "Herald notification engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "HERALD_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage scheduled jobs
    #[command(subcommand)]
    Jobs(JobCommands),

    /// Run one retry sweep now
    Sweep,

    /// Show delivery and scheduler status
    Status,
}

#[derive(Subcommand)]
enum JobCommands {
    /// List job definitions
    List,

    /// Show one job
    Get { id: i64 },

    /// Create (or upsert by --id) a job
    Add(JobArgs),

    /// Replace an existing job definition
    Update {
        id: i64,
        #[command(flatten)]
        job: JobArgs,
    },

    /// Delete a job and stop its schedule
    Delete { id: i64 },

    /// Fire a job immediately
    Run { id: i64 },
}

#[derive(Args)]
struct JobArgs {
    /// Job name (selects the action that runs)
    #[arg(short, long)]
    name: String,

    /// Cron expression, 5 or 6 fields (e.g. "0 */2 * * * *")
    #[arg(short, long)]
    schedule: String,

    #[arg(short, long, default_value = "")]
    description: String,

    /// Store the job without scheduling it
    #[arg(long)]
    inactive: bool,
}

impl JobArgs {
    fn to_params(&self, id: Option<i64>) -> Value {
        json!({
            "id": id,
            "name": self.name,
            "schedule": self.schedule,
            "description": self.description,
            "is_active": !self.inactive,
        })
    }
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize)]
struct JobView {
    job: JobRow,
    scheduled: bool,
}

#[derive(Deserialize)]
struct JobRow {
    id: i64,
    name: String,
    schedule: String,
    is_active: bool,
    description: String,
    last_executed_at: Option<i64>,
}

#[derive(Tabled)]
struct JobTableRow {
    id: i64,
    name: String,
    schedule: String,
    active: bool,
    scheduled: bool,
    last_executed_at: String,
    description: String,
}

impl From<JobView> for JobTableRow {
    fn from(view: JobView) -> Self {
        Self {
            id: view.job.id,
            name: view.job.name,
            schedule: view.job.schedule,
            active: view.job.is_active,
            scheduled: view.scheduled,
            last_executed_at: view
                .job
                .last_executed_at
                .map(|ms| ms.to_string())
                .unwrap_or_else(|| "-".to_string()),
            description: view.job.description,
        }
    }
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn print_jobs(views: Vec<JobView>) {
    if views.is_empty() {
        println!("{}", "No jobs defined".yellow());
        return;
    }
    let rows: Vec<JobTableRow> = views.into_iter().map(JobTableRow::from).collect();
    println!("{}", Table::new(rows));
}

async fn run_jobs(url: &str, command: JobCommands) -> Result<()> {
    match command {
        JobCommands::List => {
            let result = call_rpc(url, "jobs.list.v1", json!({})).await?;
            let views: Vec<JobView> = serde_json::from_value(result["jobs"].clone())?;
            print_jobs(views);
        }

        JobCommands::Get { id } => {
            let result = call_rpc(url, "jobs.get.v1", json!({ "id": id })).await?;
            print_jobs(vec![serde_json::from_value(result)?]);
        }

        JobCommands::Add(job) => {
            let result = call_rpc(url, "jobs.add.v1", job.to_params(None)).await?;
            let view: JobView = serde_json::from_value(result)?;
            println!(
                "{}",
                format!("✓ Job {} saved", view.job.id).green().bold()
            );
            if job.inactive || !view.scheduled {
                println!("  {} not scheduled (inactive or invalid schedule)", "○".yellow());
            }
            print_jobs(vec![view]);
        }

        JobCommands::Update { id, job } => {
            let result = call_rpc(url, "jobs.update.v1", job.to_params(Some(id))).await?;
            println!("{}", format!("✓ Job {} updated", id).green().bold());
            print_jobs(vec![serde_json::from_value(result)?]);
        }

        JobCommands::Delete { id } => {
            let result = call_rpc(url, "jobs.delete.v1", json!({ "id": id })).await?;
            if result["deleted"].as_bool().unwrap_or(false) {
                println!("{}", format!("✓ Job {} deleted", id).green().bold());
            } else {
                println!("{}", format!("Job {} did not exist", id).yellow());
            }
        }

        JobCommands::Run { id } => {
            let result = call_rpc(url, "jobs.run.v1", json!({ "id": id })).await?;
            println!(
                "{} job {}: {}",
                "✓".green(),
                id,
                result["outcome"].as_str().unwrap_or("unknown")
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Jobs(command) => run_jobs(&cli.rpc_url, command).await?,

        Commands::Sweep => {
            let result = call_rpc(&cli.rpc_url, "notifications.sweep.v1", json!({})).await?;
            println!(
                "{} {} notifications re-driven",
                "✓".green(),
                result["redriven"]
            );
        }

        Commands::Status => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Pending:".bold(), stats["pending"]);
                    println!("  {} {}", "In flight:".bold(), stats["in_flight"]);
                    println!("  {} {}", "Sent:".bold(), stats["sent"]);
                    println!("  {} {}", "Failed:".bold(), stats["failed"]);
                    println!("  {} {}", "Abandoned:".bold(), stats["abandoned"]);
                    println!();
                    let running = stats["scheduler_running"].as_bool().unwrap_or(false);
                    println!(
                        "  {} {} ({} jobs, {} live)",
                        "Scheduler:".bold(),
                        if running { "RUNNING".green() } else { "STOPPED".red() },
                        stats["scheduled_jobs"],
                        stats["live_handles"]
                    );
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_job_add() {
        let cli = Cli::try_parse_from([
            "heraldctl",
            "jobs",
            "add",
            "--name",
            "retry_pending_notifications",
            "--schedule",
            "0 */2 * * * *",
            "--inactive",
        ])
        .unwrap();

        match cli.command {
            Commands::Jobs(JobCommands::Add(job)) => {
                let params = job.to_params(None);
                assert_eq!(params["name"], "retry_pending_notifications");
                assert_eq!(params["is_active"], false);
                assert!(params["id"].is_null());
            }
            _ => panic!("expected jobs add"),
        }
        assert_eq!(cli.rpc_url, DEFAULT_RPC_URL);
    }

    #[test]
    fn test_cli_parses_update_with_id() {
        let cli = Cli::try_parse_from([
            "heraldctl", "jobs", "update", "7", "-n", "cleanup", "-s", "0 0 * * *",
        ])
        .unwrap();
        match cli.command {
            Commands::Jobs(JobCommands::Update { id, job }) => {
                assert_eq!(job.to_params(Some(id))["id"], 7);
                assert_eq!(job.to_params(Some(id))["is_active"], true);
            }
            _ => panic!("expected jobs update"),
        }
    }
}
