//! The line protocol spoken between client and server.
//!
//! Every frame is one `\n`-terminated line. The client sends raw record
//! lines and `/`-prefixed commands. The server answers with free-form
//! message lines and `%name%` control lines.

/// Asks the server to end the session.
pub const QUIT_COMMAND: &str = "/quit";
/// Sent by the server right before [`QUIT_CONTROL`].
pub const SHUTDOWN_NOTICE: &str = "I'm shutting down now.";
/// Control line that tells the client the server is hanging up.
pub const QUIT_CONTROL: &str = "%quit%";
/// The server's reply to any command it does not know.
pub const UNRECOGNIZED_REPLY: &str = "Unrecognized command.";

/// A command sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
  Quit,
  Unknown(&'a str),
}

/// One line received by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientLine<'a> {
  Empty,
  Command(Command<'a>),
  Record(&'a str),
}

/// Classifies a line sent by the client. A trailing `\r` is ignored.
pub fn parse_client_line(line: &str) -> ClientLine<'_> {
  let line = line.trim_end_matches('\r');
  if line.is_empty() {
    return ClientLine::Empty;
  }
  if line.starts_with('/') {
    let command = match line {
      QUIT_COMMAND => Command::Quit,
      other => Command::Unknown(other),
    };
    return ClientLine::Command(command);
  }
  ClientLine::Record(line)
}

/// One line received by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLine<'a> {
  /// A `%name%` control line; holds `name`.
  Control(&'a str),
  Message(&'a str),
}

pub fn parse_server_line(line: &str) -> ServerLine<'_> {
  let line = line.trim_end_matches('\r');
  match line
    .strip_prefix('%')
    .and_then(|rest| rest.strip_suffix('%'))
  {
    Some(name) => ServerLine::Control(name),
    None => ServerLine::Message(line),
  }
}
