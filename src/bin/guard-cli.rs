use std::path::PathBuf;
use std::time::SystemTime;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use webhook_guard::webhook::request::unix_secs;
use webhook_guard::webhook::signature::{
    sign_square, sign_stripe, sign_whatsapp, SQUARE_SIGNATURE_HEADER, SQUARE_TIMESTAMP_HEADER,
    STRIPE_SIGNATURE_HEADER, WHATSAPP_SIGNATURE_HEADER,
};
use webhook_guard::webhook::Provider;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Management CLI for webhook-guard", long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Admin API key.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// Accepted/rejected counters and store sizes
    Stats,
    /// Print the signature headers a provider would send for a payload
    Sign {
        #[arg(long)]
        provider: Provider,

        #[arg(long)]
        secret: String,

        /// Notification URL (required for Square).
        #[arg(long = "notification-url")]
        notification_url: Option<String>,

        /// Unix timestamp to sign with. Defaults to now.
        #[arg(long)]
        timestamp: Option<i64>,

        /// File holding the exact request body.
        body_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => admin_get(&cli.url, cli.key.as_deref(), "/admin/status").await?,
        Commands::Stats => admin_get(&cli.url, cli.key.as_deref(), "/admin/stats").await?,
        Commands::Sign {
            provider,
            secret,
            notification_url,
            timestamp,
            body_file,
        } => {
            let body = std::fs::read(&body_file)?;
            let timestamp = timestamp.unwrap_or_else(|| unix_secs(SystemTime::now()));
            for (name, value) in sign(provider, secret.as_bytes(), notification_url.as_deref(), timestamp, &body)? {
                println!("{name}: {value}");
            }
        }
    }

    Ok(())
}

fn sign(
    provider: Provider,
    secret: &[u8],
    notification_url: Option<&str>,
    timestamp: i64,
    body: &[u8],
) -> Result<Vec<(&'static str, String)>, Box<dyn std::error::Error>> {
    Ok(match provider {
        Provider::WhatsApp => vec![(WHATSAPP_SIGNATURE_HEADER, sign_whatsapp(secret, body))],
        Provider::Square => {
            let url = notification_url.ok_or("--notification-url is required for square")?;
            vec![
                (SQUARE_SIGNATURE_HEADER, sign_square(secret, url, body)),
                (SQUARE_TIMESTAMP_HEADER, timestamp.to_string()),
            ]
        }
        Provider::Stripe => vec![(STRIPE_SIGNATURE_HEADER, sign_stripe(secret, timestamp, body))],
    })
}

async fn admin_get(base: &str, key: Option<&str>, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let key = key.ok_or("--key is required for admin commands")?;
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);

    let res = reqwest::Client::new()
        .get(format!("{}{}", base.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
