use clap::{Parser, Subcommand};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "ssp-cli")]
#[command(about = "Command line client for the Smart Service Proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered proxy URIs
    Services,
    /// Fetch a resource through the proxy
    Get {
        /// Proxy URI, absolute or relative to --url
        uri: String,
        /// Requested RDF serialization
        #[arg(short, long, default_value = "text/turtle")]
        accept: String,
    },
    /// Run a SPARQL query against the cache
    Sparql {
        query: String,
        /// Endpoint path
        #[arg(short, long, default_value = "/sparql")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Services => {
            let res = client
                .get(format!("{base}/"))
                .header(ACCEPT, "application/json")
                .send()
                .await?;
            print_json(res).await?;
        }
        Commands::Get { uri, accept } => {
            let target = if uri.contains("://") {
                uri
            } else {
                format!("{base}/{}", uri.trim_start_matches('/'))
            };
            let res = client.get(target).header(ACCEPT, accept).send().await?;
            print_text(res).await?;
        }
        Commands::Sparql { query, path } => {
            let res = client
                .post(format!("{base}/{}", path.trim_start_matches('/')))
                .header(CONTENT_TYPE, "application/sparql-query")
                .header(ACCEPT, "text/turtle")
                .body(query)
                .send()
                .await?;
            let is_json = res
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.contains("json"));
            if is_json {
                print_json(res).await?;
            } else {
                print_text(res).await?;
            }
        }
    }

    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        return report_error(res).await;
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn print_text(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        return report_error(res).await;
    }

    if let Some(expires) = res.headers().get(reqwest::header::EXPIRES) {
        eprintln!("Expires: {}", expires.to_str().unwrap_or("?"));
    }
    println!("{}", res.text().await?);
    Ok(())
}

async fn report_error(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Error: proxy returned status {}", res.status());
    if let Ok(text) = res.text().await {
        eprintln!("Response: {}", text);
    }
    Ok(())
}
