use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
  time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::{
  cursor::{decode_cursor, encode_cursor, Cursor},
  models::{LinePage, LineRecord, SearchQuery, SessionInfo},
  reader::{FileReader, ReaderError, ReaderOptions},
};

#[derive(Debug, Error)]
pub enum CoreError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("reader error: {0}")]
  Reader(#[from] ReaderError),
  #[error("unknown session: {0}")]
  UnknownSession(String),
  #[error("bad cursor token: {0}")]
  BadCursor(String),
  #[error("invalid argument: {0}")]
  InvalidArg(String),
}

#[derive(Debug, Clone)]
pub struct CoreOptions {
  pub default_page_size: usize,
  pub reader: ReaderOptions,
}

impl Default for CoreOptions {
  fn default() -> Self {
    Self {
      default_page_size: 50,
      reader: ReaderOptions::default(),
    }
  }
}

struct SessionState {
  info: SessionInfo,
  reader: FileReader,
}

/// Session layer over [`FileReader`]: open a log file once, then page, tail
/// and search it through opaque cursor tokens. Each session owns its reader;
/// the session map's mutex serializes access, since a reader is exclusively
/// mutable by design.
#[derive(Clone)]
pub struct CoreEngine {
  options: CoreOptions,
  sessions: Arc<Mutex<HashMap<String, SessionState>>>,
}

impl CoreEngine {
  pub fn new(options: CoreOptions) -> Self {
    Self {
      options,
      sessions: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Opens a session on `path` and returns the first page of lines.
  pub fn open_file(&self, path: impl AsRef<Path>) -> Result<(SessionInfo, LinePage), CoreError> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let mut reader = FileReader::with_options(&path, self.options.reader.clone());
    let file_size = reader.file_size()?;

    let info = SessionInfo {
      session_id: Uuid::new_v4().to_string(),
      path: path.to_string_lossy().to_string(),
      file_size,
      created_at_ms: now_ms(),
    };

    let first_page = read_forward_page(
      &mut reader,
      Cursor { offset: 0, line: Some(0) },
      self.options.default_page_size,
    )?;

    self.sessions.lock().insert(
      info.session_id.clone(),
      SessionState { info: info.clone(), reader },
    );
    Ok((info, first_page))
  }

  /// Forward paging. A missing cursor starts at the beginning of the file.
  /// A full page ending exactly at end-of-file still yields a cursor, so a
  /// tailing caller can keep polling it as the file grows.
  pub fn next_page(
    &self,
    session_id: &str,
    cursor: Option<&str>,
    page_size: usize,
  ) -> Result<LinePage, CoreError> {
    let cursor = decode_cursor(cursor)?;
    let page_size = self.effective_page_size(page_size);
    self.with_session(session_id, |state| {
      read_forward_page(&mut state.reader, cursor, page_size)
    })
  }

  /// Backward paging; records come back in file order. A missing cursor
  /// starts at end-of-file, which makes this the "tail" operation.
  pub fn previous_page(
    &self,
    session_id: &str,
    cursor: Option<&str>,
    page_size: usize,
  ) -> Result<LinePage, CoreError> {
    let cursor = match cursor {
      Some(t) => Some(decode_cursor(Some(t))?),
      None => None,
    };
    let page_size = self.effective_page_size(page_size);
    self.with_session(session_id, |state| {
      let from = match cursor {
        Some(c) => c.offset,
        None => state.reader.file_size()?,
      };
      read_backward_page(&mut state.reader, from, page_size)
    })
  }

  /// Scans line by line from `cursor` (or the relevant file boundary) for
  /// the first line containing `query.text`.
  pub fn search(
    &self,
    session_id: &str,
    cursor: Option<&str>,
    query: SearchQuery,
  ) -> Result<Option<LineRecord>, CoreError> {
    if query.text.is_empty() {
      return Err(CoreError::InvalidArg("query.text is empty".into()));
    }
    let cursor = match cursor {
      Some(t) => Some(decode_cursor(Some(t))?),
      None => None,
    };
    self.with_session(session_id, |state| {
      let reader = &mut state.reader;
      let from = match (&cursor, query.backward) {
        (Some(c), _) => c.offset,
        (None, false) => 0,
        (None, true) => reader.file_size()?,
      };
      reader.seek(from)?;
      let span = if query.backward {
        reader.find_previous_line_containing(&query.text, query.case_sensitive)?
      } else {
        reader.find_next_line_containing(&query.text, query.case_sensitive)?
      };
      let Some(span) = span else {
        return Ok(None);
      };
      reader.seek(span.start)?;
      match reader.next_line()? {
        Some(line) => Ok(Some(LineRecord {
          line_no: None,
          text: line.text().into_owned(),
          span: line.span(),
        })),
        None => Ok(None),
      }
    })
  }

  /// Token for forward paging from an arbitrary byte offset, e.g. to follow
  /// the file from where a tail page ended.
  pub fn cursor_for_offset(&self, session_id: &str, offset: u64) -> Result<String, CoreError> {
    self.with_session(session_id, |state| {
      let file_size = state.reader.file_size()?;
      if offset > file_size {
        return Err(CoreError::InvalidArg(format!(
          "offset {offset} beyond file size {file_size}"
        )));
      }
      Ok(encode_cursor(Cursor { offset, line: None }))
    })
  }

  /// Rebuilds the session's reader from the current file state and returns a
  /// fresh first page. The way out after a `FileOverwritten` error.
  pub fn reload(&self, session_id: &str) -> Result<(SessionInfo, LinePage), CoreError> {
    let page_size = self.options.default_page_size;
    let reader_options = self.options.reader.clone();
    self.with_session(session_id, |state| {
      let mut reader = FileReader::with_options(Path::new(&state.info.path), reader_options);
      state.info.file_size = reader.file_size()?;
      let page = read_forward_page(&mut reader, Cursor { offset: 0, line: Some(0) }, page_size)?;
      state.reader = reader;
      Ok((state.info.clone(), page))
    })
  }

  pub fn close_session(&self, session_id: &str) -> Result<(), CoreError> {
    self
      .sessions
      .lock()
      .remove(session_id)
      .map(|_| ())
      .ok_or_else(|| CoreError::UnknownSession(session_id.to_string()))
  }

  fn effective_page_size(&self, page_size: usize) -> usize {
    if page_size == 0 {
      self.options.default_page_size
    } else {
      page_size
    }
  }

  fn with_session<T>(
    &self,
    session_id: &str,
    f: impl FnOnce(&mut SessionState) -> Result<T, CoreError>,
  ) -> Result<T, CoreError> {
    let mut sessions = self.sessions.lock();
    let state = sessions
      .get_mut(session_id)
      .ok_or_else(|| CoreError::UnknownSession(session_id.to_string()))?;
    f(state)
  }
}

fn read_forward_page(
  reader: &mut FileReader,
  cursor: Cursor,
  page_size: usize,
) -> Result<LinePage, CoreError> {
  reader.seek(cursor.offset)?;
  let mut records = Vec::with_capacity(page_size);
  let mut line_no = cursor.line;
  let mut next_offset = cursor.offset;
  let mut reached_eof = false;
  while records.len() < page_size {
    match reader.next_line()? {
      Some(line) => {
        records.push(LineRecord {
          line_no,
          text: line.text().into_owned(),
          span: line.span(),
        });
        line_no = line_no.map(|n| n + 1);
        next_offset = line.span().end;
      }
      None => {
        reached_eof = true;
        break;
      }
    }
  }
  let next_cursor = if reached_eof {
    None
  } else {
    Some(encode_cursor(Cursor { offset: next_offset, line: line_no }))
  };
  Ok(LinePage { records, next_cursor, reached_eof })
}

fn read_backward_page(
  reader: &mut FileReader,
  from: u64,
  page_size: usize,
) -> Result<LinePage, CoreError> {
  reader.seek(from)?;
  let mut records = Vec::with_capacity(page_size);
  let mut reached_start = false;
  while records.len() < page_size {
    match reader.previous_line()? {
      Some(line) => records.push(LineRecord {
        line_no: None,
        text: line.text().into_owned(),
        span: line.span(),
      }),
      None => {
        reached_start = true;
        break;
      }
    }
  }
  records.reverse();
  let next_cursor = match (reached_start, records.first()) {
    (false, Some(first)) => Some(encode_cursor(Cursor { offset: first.span.start, line: None })),
    _ => None,
  };
  Ok(LinePage {
    records,
    next_cursor,
    reached_eof: reached_start,
  })
}

fn now_ms() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as i64
}
