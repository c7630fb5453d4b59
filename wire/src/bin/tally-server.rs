use std::env;
use std::path::Path;
use std::process::ExitCode;

use tally_engine::Aggregation;
use tally_wire::{Server, ServerConfig};
use tracing::{error, info};

async fn serve(config_path: &Path) -> tally_wire::Result<Aggregation> {
  let config = ServerConfig::load(config_path)?;
  let server = Server::bind(&config).await?;
  server.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
  tally_wire::init_tracing();

  let Some(path) = env::args_os().nth(1) else {
    eprintln!("usage: tally-server <config.yaml>");
    return ExitCode::from(2);
  };

  match serve(Path::new(&path)).await {
    Ok(aggregation) => {
      for (group, total) in aggregation.totals.into_sorted() {
        info!("Popularity {total} for group {group}");
      }
      info!(stats = ?aggregation.stats, "done");
      ExitCode::SUCCESS
    }
    Err(e) => {
      error!(error = %e, "server failed");
      ExitCode::FAILURE
    }
  }
}
