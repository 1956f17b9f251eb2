use clap::Parser;
use dotenv::dotenv;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use infogenie_rag::api::{self, AppState};
use infogenie_rag::{RagPipeline, Settings};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value = "8000")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load environment variables
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = Settings::from_env()?;

    tokio::fs::create_dir_all(&settings.docs_directory).await?;

    // A pipeline that fails to start leaves the server up, answering 503.
    let pipeline = match RagPipeline::new(settings.clone()).await {
        Ok(pipeline) => {
            info!("RAG pipeline initialized successfully.");
            Some(Arc::new(pipeline))
        }
        Err(e) => {
            error!("Failed to initialize RAG pipeline: {}", e);
            None
        }
    };

    let app = api::create_api(AppState::new(pipeline, settings));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| format!("Invalid bind address {}:{}: {}", args.host, args.port, e))?;

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    info!("Server successfully bound to {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
