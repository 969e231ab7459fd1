use clap::{Parser, Subcommand};
use reqwest::StatusCode;

#[derive(Parser)]
#[command(name = "server-ctl")]
#[command(about = "Management CLI for the notebook server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Accept self-signed certificates when talking to a TLS listener.
    #[arg(long)]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server answers
    Ping,
    /// Show whether the server has finished starting
    Readiness,
    /// Show whether the server process is alive
    Liveness,
    /// Dump Prometheus metrics
    Metrics,
}

impl Commands {
    fn path(&self) -> &'static str {
        match self {
            Commands::Ping => "/ping",
            Commands::Readiness => "/health/readiness",
            Commands::Liveness => "/health/liveness",
            Commands::Metrics => "/metrics",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(cli.insecure)
        .build()?;

    let url = format!("{}{}", cli.url.trim_end_matches('/'), cli.command.path());
    let res = client.get(url).send().await?;
    let healthy = print_response(res).await?;
    if !healthy {
        std::process::exit(1);
    }
    Ok(())
}

/// Print the body; JSON is pretty-printed. Returns whether the status was 2xx.
async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let body = match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{}", body.trim_end());
    } else {
        eprintln!("Error: management API returned status {}", status);
        if status != StatusCode::NOT_FOUND || !body.is_empty() {
            eprintln!("Response: {}", body.trim_end());
        }
    }
    Ok(status.is_success())
}
