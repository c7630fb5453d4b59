//! Records, where they come from and where totals go.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::hash::BuildHasher;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::trace;

use crate::error::Result;

/// One keyed input item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Record {
  pub key: String,
  pub value: i64,
}

impl Record {
  pub fn new(key: impl Into<String>, value: i64) -> Self {
    Self {
      key: key.into(),
      value,
    }
  }
}

impl<K: Into<String>> From<(K, i64)> for Record {
  fn from((key, value): (K, i64)) -> Self {
    Record::new(key, value)
  }
}

/// Receives the final `(key, total)` pairs of an aggregation.
///
/// No ordering is guaranteed; a caller that wants sorted output sorts after
/// receiving.
pub trait Sink {
  fn accept(&mut self, key: String, total: i64);
}

impl Sink for Vec<(String, i64)> {
  fn accept(&mut self, key: String, total: i64) {
    self.push((key, total));
  }
}

impl<S: BuildHasher> Sink for HashMap<String, i64, S> {
  fn accept(&mut self, key: String, total: i64) {
    self.insert(key, total);
  }
}

impl Sink for BTreeMap<String, i64> {
  fn accept(&mut self, key: String, total: i64) {
    self.insert(key, total);
  }
}

/// Adapts a closure into a [`Sink`].
pub struct FnSink<F>(pub F);

impl<F: FnMut(String, i64)> Sink for FnSink<F> {
  fn accept(&mut self, key: String, total: i64) {
    (self.0)(key, total)
  }
}

/// Selects the group key and the summed value out of a delimited line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FieldMapping {
  /// Zero-based position of the group key.
  pub key_field: usize,
  /// Zero-based position of the summed value.
  pub value_field: usize,
  pub delimiter: char,
  /// Skip the first line of the input.
  pub skip_header: bool,
}

impl Default for FieldMapping {
  fn default() -> Self {
    Self {
      key_field: 0,
      value_field: 1,
      delimiter: ',',
      skip_header: false,
    }
  }
}

impl FieldMapping {
  pub fn new(key_field: usize, value_field: usize) -> Self {
    Self {
      key_field,
      value_field,
      ..Self::default()
    }
  }

  pub fn delimiter(mut self, delimiter: char) -> Self {
    self.delimiter = delimiter;
    self
  }

  pub fn skip_header(mut self, skip_header: bool) -> Self {
    self.skip_header = skip_header;
    self
  }

  /// Maps already-split fields into a record.
  ///
  /// Parsing is lenient: a missing or unparsable value becomes `0` and a
  /// missing key becomes the empty key, which every table ignores.
  pub fn map_fields<S: AsRef<str>>(&self, fields: &[S]) -> Record {
    let key = fields
      .get(self.key_field)
      .map_or("", |f| f.as_ref())
      .to_owned();
    let raw = fields.get(self.value_field).map_or("", |f| f.as_ref());
    Record::new(key, parse_value(raw))
  }

  /// Splits `line` on the delimiter and maps it into a record.
  pub fn map_line(&self, line: &str) -> Record {
    let fields: Vec<&str> = line.split(self.delimiter).collect();
    self.map_fields(&fields)
  }
}

/// Parses a summable value, substituting `0` for anything malformed.
pub fn parse_value(raw: &str) -> i64 {
  match raw.trim().parse::<i64>() {
    Ok(value) => value,
    Err(_) => {
      trace!(field = raw, "unparsable value, counting it as zero");
      0
    }
  }
}

/// Yields records from the lines of a reader.
///
/// Blank lines are skipped. I/O failures end the stream with an error.
pub struct LineSource<R> {
  lines: std::io::Lines<R>,
  mapping: FieldMapping,
  header_pending: bool,
}

impl<R: BufRead> LineSource<R> {
  pub fn new(reader: R, mapping: FieldMapping) -> Self {
    let header_pending = mapping.skip_header;
    Self {
      lines: reader.lines(),
      mapping,
      header_pending,
    }
  }
}

impl LineSource<BufReader<File>> {
  /// Opens a file as a record source.
  pub fn open(path: impl AsRef<Path>, mapping: FieldMapping) -> Result<Self> {
    let file = File::open(path)?;
    Ok(Self::new(BufReader::new(file), mapping))
  }
}

impl<R: BufRead> Iterator for LineSource<R> {
  type Item = Result<Record>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let line = match self.lines.next()? {
        Ok(line) => line,
        Err(e) => return Some(Err(e.into())),
      };
      if self.header_pending {
        self.header_pending = false;
        continue;
      }
      let line = line.trim_end_matches('\r');
      if line.is_empty() {
        continue;
      }
      return Some(Ok(self.mapping.map_line(line)));
    }
  }
}

/// Reads every record from a file.
pub fn read_records(path: impl AsRef<Path>, mapping: FieldMapping) -> Result<Vec<Record>> {
  LineSource::open(path, mapping)?.collect()
}
