use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "mirror-cli")]
#[command(about = "Management CLI for the datacenter config mirror", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "MIRROR_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every config unit
    List,
    /// Show one config unit
    Get { name: String },
    /// Create or replace a config unit; VALUE is parsed as JSON, else taken as a string
    Put { name: String, value: String },
    /// Delete a config unit
    Delete { name: String },
    /// Show mirror sync state
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let base = format!("{}/v2/configs/datacenter", cli.url.trim_end_matches('/'));

    let res = match cli.command {
        Commands::List => client.get(&base).headers(headers).send().await?,
        Commands::Get { name } => {
            client.get(unit_url(&base, &name)?).headers(headers).send().await?
        }
        Commands::Put { name, value } => {
            let value = serde_json::from_str::<Value>(&value).unwrap_or(Value::String(value));
            client
                .put(unit_url(&base, &name)?)
                .headers(headers)
                .json(&json!({ "name": name, "value": value }))
                .send()
                .await?
        }
        Commands::Delete { name } => {
            client.delete(unit_url(&base, &name)?).headers(headers).send().await?
        }
        Commands::Health => {
            let url = format!("{}/health", cli.url.trim_end_matches('/'));
            client.get(url).send().await?
        }
    };

    print_response(res).await
}

/// `{base}/{name}` with `name` percent-encoded as one path segment.
fn unit_url(base: &str, name: &str) -> Result<Url, Box<dyn std::error::Error>> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| format!("{base} cannot be a base URL"))?
        .push(name);
    Ok(url)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    if text.is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
