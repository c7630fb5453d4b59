use std::io;
use std::path::Path;
use std::time::Duration;

use tally_engine::Record;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use crate::error::Result;
use crate::protocol::{parse_server_line, ServerLine, QUIT_COMMAND};
use crate::server::write_line;

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Field delimiter of the lines written by [`Client::send_records`].
pub const RECORD_DELIMITER: char = ',';

// A key holding the delimiter or a line break would be split differently
// on the server, so it cannot be sent as a record line.
fn record_line(record: &Record) -> io::Result<String> {
  if record
    .key
    .contains(|c: char| c == RECORD_DELIMITER || c == '\n' || c == '\r')
  {
    return Err(io::Error::new(
      io::ErrorKind::InvalidInput,
      format!("key {:?} cannot be sent as a record line", record.key),
    ));
  }
  Ok(format!("{}{}{}", record.key, RECORD_DELIMITER, record.value))
}

/// Streams record lines to a server and performs the `/quit` handshake.
pub struct Client {
  lines: Lines<BufReader<OwnedReadHalf>>,
  writer: OwnedWriteHalf,
  write_timeout: Duration,
}

impl Client {
  pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
    let stream = TcpStream::connect(addr).await?;
    info!(peer = %stream.peer_addr()?, "connected");
    let (reader, writer) = stream.into_split();
    Ok(Self {
      lines: BufReader::new(reader).lines(),
      writer,
      write_timeout: DEFAULT_WRITE_TIMEOUT,
    })
  }

  /// Bounds every single line write. A write that takes longer fails with
  /// [`io::ErrorKind::TimedOut`].
  pub fn write_timeout(mut self, timeout: Duration) -> Self {
    self.write_timeout = timeout;
    self
  }

  /// Sends one raw line. The newline is appended.
  pub async fn send_line(&mut self, line: &str) -> Result<()> {
    match tokio::time::timeout(self.write_timeout, write_line(&mut self.writer, line)).await {
      Ok(written) => Ok(written?),
      Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "line write timed out").into()),
    }
  }

  /// Sends records as `key,value` lines, matching the default field mapping.
  ///
  /// Fails with [`io::ErrorKind::InvalidInput`] before writing a record whose
  /// key contains [`RECORD_DELIMITER`] or a line break. Records before it
  /// have already been sent.
  pub async fn send_records<'a, I>(&mut self, records: I) -> Result<usize>
  where
    I: IntoIterator<Item = &'a Record>,
  {
    let mut sent = 0;
    for record in records {
      let line = record_line(record)?;
      self.send_line(&line).await?;
      sent += 1;
    }
    Ok(sent)
  }

  /// Streams every non-empty line of a file, optionally skipping the first.
  /// Returns the number of lines sent.
  pub async fn stream_file(&mut self, path: impl AsRef<Path>, skip_header: bool) -> Result<usize> {
    let path = path.as_ref();
    let mut lines = BufReader::new(File::open(path).await?).lines();
    let mut header_pending = skip_header;
    let mut sent = 0;

    while let Some(line) = lines.next_line().await? {
      if header_pending {
        header_pending = false;
        continue;
      }
      let line = line.trim_end_matches('\r');
      if line.is_empty() {
        continue;
      }
      self.send_line(line).await?;
      sent += 1;
    }
    info!(path = %path.display(), lines = sent, "file sent");
    Ok(sent)
  }

  /// Sends `/quit` and reads the server's replies until it hangs up with
  /// `%quit%`. Returns every message line received on the way.
  pub async fn quit(mut self) -> Result<Vec<String>> {
    self.send_line(QUIT_COMMAND).await?;

    let mut messages = Vec::new();
    while let Some(line) = self.lines.next_line().await? {
      match parse_server_line(&line) {
        ServerLine::Control("quit") => {
          info!("server is leaving, hanging up");
          return Ok(messages);
        }
        ServerLine::Control(other) => debug!(control = other, "ignoring control line"),
        ServerLine::Message(message) => {
          info!(message, "server says");
          messages.push(message.to_string());
        }
      }
    }
    Err(
      io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "server closed the connection before %quit%",
      )
      .into(),
    )
  }
}
