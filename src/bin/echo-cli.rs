use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "echo-cli")]
#[command(about = "Inspect a running request-echo server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the request history, newest first
    Logs {
        /// Only show this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Send a request and print how the server saw it
    Probe {
        /// Path to request
        #[arg(default_value = "/")]
        path: String,

        /// JSON body; sends a GET without one
        #[arg(short, long)]
        json: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Logs { limit } => {
            let res = client.get(format!("{}/logs", base)).send().await?;
            let Some(mut json) = read_json(res).await? else {
                return Ok(());
            };
            if let (Some(limit), Value::Array(entries)) = (limit, &mut json) {
                entries.truncate(limit);
            }
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Commands::Probe { path, json } => {
            let url = format!("{}/{}", base, path.trim_start_matches('/'));
            let req = match json {
                Some(body) => {
                    let body: Value = serde_json::from_str(&body)?;
                    client.post(url).json(&body)
                }
                None => client.get(url),
            };
            if let Some(json) = read_json(req.send().await?).await? {
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
        }
    }

    Ok(())
}

async fn read_json(res: reqwest::Response) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(None);
    }
    Ok(Some(res.json().await?))
}
