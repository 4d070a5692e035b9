use anyhow::{Context, Result, anyhow};
use clap::Parser;
use strands::api::{Cli, Command, run_http_server, run_projection};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { port } => run_http_server(port)
            .await
            .with_context(|| format!("HTTP server on port {port} failed")),
        Command::Project(args) => {
            let json = run_projection(args).map_err(|e| anyhow!(e))?;
            println!("{json}");
            Ok(())
        }
    }
}
