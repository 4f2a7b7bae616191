use clap::{Parser, Subcommand};
use quarry_client::quarry_api::ValueMap;
use quarry_client::quarry_api::codec::encode_untyped;
use quarry_client::{CancellationToken, Client, ClientConfig, Error, Job};

#[derive(Parser)]
#[command(name = "quarry", about = "Run queries and manage jobs on the warehouse service")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, default_value = "quarry.toml", env = "QUARRY_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a query and print its rows as JSON lines.
    Query {
        sql: String,
        /// Always create a job instead of trying the synchronous call.
        #[arg(long)]
        force_job: bool,
        /// Stop after printing this many rows.
        #[arg(long)]
        max_rows: Option<usize>,
    },
    /// Show the status of a job.
    Job { id: String },
    /// Wait for a job to finish.
    Wait { id: String },
    /// Ask the service to cancel a job.
    Cancel { id: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    tracing::debug!(config = %cli.config, "loading configuration");
    let config = match ClientConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };
    let client = match Client::from_config(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to create client");
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling");
            trigger.cancel();
        }
    });

    if let Err(e) = run(&client, cli.command, &cancel).await {
        tracing::error!(error = %e, "command failed");
        std::process::exit(if e.is_cancelled() { 130 } else { 1 });
    }
}

async fn run(client: &Client, command: Command, cancel: &CancellationToken) -> Result<(), Error> {
    match command {
        Command::Query {
            sql,
            force_job,
            max_rows,
        } => {
            let mut rows = client.query(sql).force_job(force_job).read(cancel).await?;
            let mut printed = 0usize;
            while max_rows.is_none_or(|max| printed < max) {
                let Some(row) = rows.next::<ValueMap>(cancel).await? else {
                    break;
                };
                println!("{}", serde_json::Value::Object(encode_untyped(&row)?));
                printed += 1;
            }
            tracing::info!(rows = printed, total = rows.total_rows(), "query finished");
        }
        Command::Job { id } => {
            let job = client.job_from_id(&id, cancel).await?;
            print_status(&job);
        }
        Command::Wait { id } => {
            let mut job = client.job_from_id(&id, cancel).await?;
            let result = job.wait(cancel).await.map(|_| ());
            print_status(&job);
            result?;
        }
        Command::Cancel { id } => {
            let mut job = client.job_from_id(&id, cancel).await?;
            job.cancel(cancel).await?;
            print_status(&job);
        }
    }
    Ok(())
}

fn print_status(job: &Job) {
    let status = job.last_status();
    let summary = serde_json::json!({
        "job_id": job.id(),
        "location": job.location(),
        "kind": job.kind().map(|k| format!("{k:?}")),
        "state": format!("{:?}", status.state),
        "error": status.err().map(|e| e.error.to_string()),
    });
    println!("{summary}");
}
