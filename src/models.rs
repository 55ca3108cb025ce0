use serde::{Deserialize, Serialize};

/// Absolute byte span of one line. `end` is the start of the following line,
/// so the terminator bytes sit inside the span and consecutive forward spans
/// tile the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
  pub start: u64,
  pub end: u64,
}

impl LineSpan {
  pub fn len(&self) -> u64 {
    self.end - self.start
  }

  pub fn is_empty(&self) -> bool {
    self.end == self.start
  }
}

/// How the file on disk relates to the reader's last observation of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChange {
  /// Same size as before. In-place edits that keep the size are reported as
  /// unchanged too.
  Unchanged,
  /// The file grew and the old tail bytes are still in place.
  Appended,
  /// The file shrank, or grew with its old tail rewritten.
  Overwritten,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
  pub session_id: String,
  pub path: String,
  /// Size at open time; the file may have grown since.
  pub file_size: u64,
  pub created_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRecord {
  /// Absolute line number. Only known while paging forward from the start of
  /// the file.
  pub line_no: Option<u64>,
  pub text: String,
  pub span: LineSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinePage {
  pub records: Vec<LineRecord>,
  /// Token continuing in the page's direction, or None when the file
  /// boundary was reached.
  pub next_cursor: Option<String>,
  /// No further records in the paging direction.
  pub reached_eof: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
  pub text: String,
  pub case_sensitive: bool,
  pub backward: bool,
}

impl Default for SearchQuery {
  fn default() -> Self {
    Self {
      text: String::new(),
      case_sensitive: false,
      backward: false,
    }
  }
}
