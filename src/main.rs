use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use embedding_client::{
    Client, EmbeddingRequest, EmbeddingResponse, DEFAULT_EMBEDDINGS_URL, DEFAULT_EMBEDDING_MODEL,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Request a text embedding and save the response as JSON
#[derive(Parser, Debug)]
#[command(name = "embed")]
#[command(about = "Request a text embedding and save the response as JSON", long_about = None)]
struct Args {
    /// Text to embed
    input: String,

    /// Embedding model
    #[arg(long, env = "OPENAI_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    model: String,

    /// Embeddings endpoint URL
    #[arg(long, env = "OPENAI_EMBEDDINGS_URL", default_value = DEFAULT_EMBEDDINGS_URL)]
    url: String,

    /// API key sent as a bearer token
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Where the response JSON is written
    #[arg(long, default_value = "data.json")]
    output: PathBuf,

    /// Where the error message is written when the request fails
    #[arg(long, default_value = "error.log")]
    error_log: PathBuf,

    /// Give up after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn write_response(path: &Path, response: &EmbeddingResponse) -> Result<()> {
    let json = serde_json::to_string(response)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

/// Saves the outcome of one call: the response JSON to `output`, or the error
/// message to `error_log`. A failed call is still returned as an error.
fn persist(
    result: std::result::Result<EmbeddingResponse, embedding_client::Error>,
    output: &Path,
    error_log: &Path,
) -> Result<()> {
    match result {
        Ok(response) => {
            write_response(output, &response)?;
            info!("API call successful, wrote {}", output.display());
            Ok(())
        }
        Err(e) => {
            error!("Error during API call: {}", e);
            std::fs::write(error_log, e.to_string())
                .with_context(|| format!("writing {}", error_log.display()))?;
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    info!(model = %args.model, url = %args.url, "requesting embedding");

    let mut client = Client::new()?;
    if let Some(secs) = args.timeout_secs {
        client = client.with_timeout(Duration::from_secs(secs));
    }

    let request = EmbeddingRequest::new(args.url, args.model, args.input, args.api_key);
    let result = client.request_embedding(&request).await;

    persist(result, &args.output, &args.error_log)
}
