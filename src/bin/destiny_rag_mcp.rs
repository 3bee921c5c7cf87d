

use destiny_rag::mcp::run_server;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP transport
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive("destiny_rag=warn".parse()?)
                .add_directive("destiny_rag::mcp=info".parse()?)
        )
        .init();

    let config_path = std::env::args().nth(1);
    run_server(config_path.as_deref()).await
}
