//! CLI for talking to a coordinator

use anyhow::Context;
use clap::{Parser, Subcommand};
use ringkv::common::{encode_key, parse_duration, VectorClock};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "ringkv")]
#[command(about = "ringkv replicated key-value store CLI")]
#[command(version)]
struct Cli {
    /// Coordinator URL
    #[arg(long, default_value = "http://localhost:5000", global = true)]
    coordinator: String,

    /// Caller deadline (e.g. 500ms, 2s)
    #[arg(long, global = true)]
    timeout: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a value
    Put {
        /// Key
        key: String,

        /// Value
        value: String,

        /// Causal context as JSON, e.g. '{"127.0.0.1:6001":2}'
        #[arg(long)]
        clock: Option<String>,
    },

    /// Fetch every version of a key
    Get {
        /// Key
        key: String,
    },

    /// Show coordinator and preference list for a key
    Prefs {
        /// Key
        key: String,
    },

    /// Delete the coordinator's versions of a key
    Delete {
        /// Key
        key: String,
    },
}

async fn send(req: reqwest::RequestBuilder, timeout_ms: Option<u64>) -> anyhow::Result<Value> {
    let req = match timeout_ms {
        Some(ms) => req.header(ringkv::coordinator::http::TIMEOUT_HEADER, ms.to_string()),
        None => req,
    };
    let resp = req.send().await.context("coordinator unreachable")?;
    let status = resp.status();
    let body: Value = resp.json().await.context("invalid response body")?;
    if !status.is_success() {
        let msg = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        anyhow::bail!("{} ({})", msg, status);
    }
    Ok(body)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.coordinator.trim_end_matches('/');
    let timeout_ms = cli
        .timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(|d| d.as_millis() as u64);

    match cli.command {
        Commands::Put { key, value, clock } => {
            let clock: Option<VectorClock> = clock
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("invalid --clock")?;
            let body = json!({ "key": key, "value": value, "vectorClock": clock });
            let resp = send(client.put(format!("{}/set", base)).json(&body), timeout_ms).await?;
            println!("Stored {}", key);
            println!("  Vector clock: {}", resp["vectorClock"]);
        }

        Commands::Get { key } => {
            let url = format!("{}/get/{}", base, encode_key(&key));
            let resp = send(client.get(url), timeout_ms).await?;
            let versions = resp["versions"].as_array().cloned().unwrap_or_default();
            println!("{} version(s) of {}", versions.len(), key);
            for v in versions {
                println!(
                    "  {}  clock={}  created={}",
                    v["value"], v["vectorClock"], v["createdAt"]
                );
            }
        }

        Commands::Prefs { key } => {
            let url = format!("{}/preference-list", base);
            let resp = send(client.get(url).query(&[("key", &key)]), timeout_ms).await?;
            println!("Key: {}", key);
            println!("  Coordinator: {} ({})", resp["coordinator"], resp["virtualNode"]);
            println!("  Preference list: {}", resp["preferenceList"]);
        }

        Commands::Delete { key } => {
            let url = format!("{}/delete/{}", base, encode_key(&key));
            send(client.delete(url), timeout_ms).await?;
            println!("Deleted {}", key);
        }
    }

    Ok(())
}
