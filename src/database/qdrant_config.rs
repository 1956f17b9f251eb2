use qdrant_client::{config::QdrantConfig, Qdrant};
use std::time::Duration;

use super::vector_store::VectorStoreError;

/// Connects to Qdrant over gRPC and checks the connection with a cheap call.
pub async fn create_qdrant_client(url: &str) -> Result<Qdrant, VectorStoreError> {
    let url_with_scheme = grpc_url(url);
    log::info!("Attempting to connect to Qdrant with URL: {}", url_with_scheme);

    let mut config = QdrantConfig::from_url(&url_with_scheme);
    config.check_compatibility = false;
    config.timeout = Duration::from_secs(30);
    config.connect_timeout = Duration::from_secs(10);

    let client = Qdrant::new(config).map_err(|e| VectorStoreError::Connection(e.to_string()))?;

    match client.list_collections().await {
        Ok(_) => {
            log::info!("Successfully connected to Qdrant");
            Ok(client)
        }
        Err(e) => {
            log::error!("Connection test failed: {}", e);
            Err(VectorStoreError::Connection(format!(
                "Failed to connect to Qdrant: {}",
                e
            )))
        }
    }
}

/// Normalises a Qdrant URL to the gRPC endpoint: the REST port 6333 maps to
/// 6334 and a missing scheme becomes `http`.
fn grpc_url(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", url),
    };
    let rest = rest.trim_end_matches('/');
    let rest = match rest.strip_suffix(":6333") {
        Some(host) => format!("{}:6334", host),
        None => rest.to_string(),
    };
    format!("{}://{}", scheme, rest)
}
