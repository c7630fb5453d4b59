use std::env;
use std::path::Path;
use std::process::ExitCode;

use tally_wire::{Client, ClientConfig};
use tracing::{error, info};

async fn send(config_path: &Path) -> tally_wire::Result<()> {
  let config = ClientConfig::load(config_path)?;
  info!(addr = %config.addr(), "connecting");
  let mut client = Client::connect(config.addr())
    .await?
    .write_timeout(config.write_timeout);
  client.stream_file(&config.file, config.skip_header).await?;
  client.quit().await?;
  Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
  tally_wire::init_tracing();

  let Some(path) = env::args_os().nth(1) else {
    eprintln!("usage: tally-client <config.yaml>");
    return ExitCode::from(2);
  };

  match send(Path::new(&path)).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!(error = %e, "client failed");
      ExitCode::FAILURE
    }
  }
}
