use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tally_engine::{Aggregation, FieldMapping, Pipeline, Record};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::protocol::{
  parse_client_line, ClientLine, Command, QUIT_CONTROL, SHUTDOWN_NOTICE, UNRECOGNIZED_REPLY,
};

const ACCEPT_BACKOFF_START: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

// Doubling pause between failed accepts, so a persistent failure such as
// running out of file descriptors does not spin.
#[derive(Debug)]
struct AcceptBackoff {
  next: Duration,
}

impl AcceptBackoff {
  fn new() -> Self {
    Self {
      next: ACCEPT_BACKOFF_START,
    }
  }

  fn next_delay(&mut self) -> Duration {
    let delay = self.next;
    self.next = (self.next * 2).min(ACCEPT_BACKOFF_MAX);
    delay
  }
}

/// How a client session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
  /// The client sent `/quit` and the handshake completed.
  Quit,
  /// The client closed the connection without quitting.
  Disconnected,
}

/// Collects records from one client session per listening port, then
/// aggregates all of them in a single pipeline run.
pub struct Server {
  listeners: Vec<TcpListener>,
  mapping: FieldMapping,
  pipeline: Pipeline,
}

impl Server {
  /// Binds every address in `config` and builds its pipeline.
  pub async fn bind(config: &ServerConfig) -> Result<Self> {
    let pipeline = config.pipeline.build()?;
    Self::bind_addrs(config.addrs(), config.mapping.clone(), pipeline).await
  }

  pub async fn bind_addrs<A, I>(addrs: I, mapping: FieldMapping, pipeline: Pipeline) -> Result<Self>
  where
    A: ToSocketAddrs,
    I: IntoIterator<Item = A>,
  {
    let mut listeners = Vec::new();
    for addr in addrs {
      let listener = TcpListener::bind(addr).await?;
      info!(addr = %listener.local_addr()?, "listening");
      listeners.push(listener);
    }
    Ok(Self {
      listeners,
      mapping,
      pipeline,
    })
  }

  /// The bound addresses, in configuration order.
  pub fn local_addrs(&self) -> Result<Vec<SocketAddr>> {
    Ok(
      self
        .listeners
        .iter()
        .map(TcpListener::local_addr)
        .collect::<io::Result<_>>()?,
    )
  }

  /// Serves one session per port until every session has ended, then
  /// aggregates everything that was received.
  pub async fn run(self) -> Result<Aggregation> {
    let mut sessions = JoinSet::new();
    for listener in self.listeners {
      sessions.spawn(accept_session(listener, self.mapping.clone()));
    }

    let mut records = Vec::new();
    while let Some(received) = sessions.join_next().await {
      records.extend(received?);
    }
    info!(records = records.len(), strategy = %self.pipeline.strategy(), "all sessions ended, aggregating");

    let pipeline = self.pipeline;
    let aggregation = tokio::task::spawn_blocking(move || pipeline.run(records)).await?;
    for (group, total) in aggregation.totals.iter() {
      debug!(group, total, "group total");
    }
    Ok(aggregation)
  }
}

// Accepts connections on `listener` until one session has been served.
async fn accept_session(listener: TcpListener, mapping: FieldMapping) -> Vec<Record> {
  let mut backoff = AcceptBackoff::new();
  loop {
    let (stream, peer) = match listener.accept().await {
      Ok(accepted) => accepted,
      Err(e) => {
        let delay = backoff.next_delay();
        warn!(error = %e, ?delay, "failed to accept connection, retrying");
        tokio::time::sleep(delay).await;
        continue;
      }
    };
    info!(%peer, "client connected");
    return serve_connection(stream, peer, &mapping).await;
  }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, mapping: &FieldMapping) -> Vec<Record> {
  let mut records = Vec::new();
  match serve_session(stream, mapping, &mut records).await {
    Ok(end) => info!(%peer, records = records.len(), ?end, "client disconnected"),
    // Whatever arrived before the failure still counts.
    Err(e) => warn!(%peer, records = records.len(), error = %e, "session ended with an error"),
  }
  records
}

/// Reads record lines and commands from one client until it quits or
/// disconnects, appending every mapped record to `records`.
pub async fn serve_session<S>(
  stream: S,
  mapping: &FieldMapping,
  records: &mut Vec<Record>,
) -> io::Result<SessionEnd>
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  let (reader, mut writer) = tokio::io::split(stream);
  let mut lines = BufReader::new(reader).lines();
  let mut header_pending = mapping.skip_header;

  while let Some(line) = lines.next_line().await? {
    match parse_client_line(&line) {
      ClientLine::Empty => {}
      ClientLine::Record(_) if header_pending => header_pending = false,
      ClientLine::Record(fields) => records.push(mapping.map_line(fields)),
      ClientLine::Command(Command::Quit) => {
        debug!("quit requested");
        write_line(&mut writer, SHUTDOWN_NOTICE).await?;
        write_line(&mut writer, QUIT_CONTROL).await?;
        writer.shutdown().await?;
        return Ok(SessionEnd::Quit);
      }
      ClientLine::Command(Command::Unknown(command)) => {
        debug!(command, "unrecognized command");
        write_line(&mut writer, UNRECOGNIZED_REPLY).await?;
      }
    }
  }
  Ok(SessionEnd::Disconnected)
}

pub(crate) async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
  W: AsyncWrite + Unpin,
{
  writer.write_all(line.as_bytes()).await?;
  writer.write_all(b"\n").await?;
  writer.flush().await
}
