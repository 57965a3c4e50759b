use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Inspect a running topology proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:9000")]
    url: String,

    /// Admin API key, if the proxy requires one
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Live generation and reload report
    Status,
    /// Routing objects of the live generation
    Objects {
        /// Show a single routing object
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    let url = cli.url.trim_end_matches('/');
    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", url))
                .headers(headers)
                .send()
                .await?;
            print_response(res, None).await?;
        }
        Commands::Objects { id } => {
            let res = client
                .get(format!("{}/admin/routing/objects", url))
                .headers(headers)
                .send()
                .await?;
            print_response(res, id.as_deref()).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response, object: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    let shown = match object {
        Some(id) => json["objects"]
            .as_array()
            .and_then(|objects| objects.iter().find(|o| o["id"] == id))
            .cloned()
            .ok_or_else(|| format!("no routing object '{}'", id))?,
        None => json,
    };
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}
