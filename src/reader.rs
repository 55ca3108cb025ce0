use std::{
  fs::File,
  io::{Read, Seek, SeekFrom},
  ops::Range,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
  change::TailSnapshot,
  models::{FileChange, LineSpan},
  search::LineMatcher,
};

#[derive(Debug, Error)]
pub enum ReaderError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("invalid file offset {offset} (file size {file_size})")]
  InvalidOffset { offset: u64, file_size: u64 },
  #[error("line too long, must stay within {max} bytes")]
  LineTooLong { max: usize },
  #[error("file has been overwritten")]
  FileOverwritten,
  #[error("file has been appended")]
  FileAppended,
  #[error("internal consistency error: {0}")]
  Internal(&'static str),
}

#[derive(Debug, Clone)]
pub struct ReaderOptions {
  /// Window size in bytes. Must be even; the longest supported line is half
  /// of it.
  pub buffer_capacity: usize,
  /// Re-check the file for external changes before window refills.
  pub check_file_for_changes: bool,
  /// Absorb pure-growth changes silently instead of surfacing `FileAppended`.
  pub ignore_append_changes: bool,
}

impl Default for ReaderOptions {
  fn default() -> Self {
    Self {
      buffer_capacity: 64 * 1024,
      check_file_for_changes: true,
      ignore_append_changes: true,
    }
  }
}

/// One line handed out by the reader. The view borrows the reader's window,
/// so it must be consumed before the next navigation call.
#[derive(Debug)]
pub struct Line<'a> {
  bytes: &'a [u8],
  span: LineSpan,
}

impl<'a> Line<'a> {
  pub fn span(&self) -> LineSpan {
    self.span
  }

  /// Full span bytes, terminator included. Consecutive forward lines tile
  /// the file byte-for-byte.
  pub fn raw(&self) -> &'a [u8] {
    self.bytes
  }

  /// Line bytes with the trailing terminator stripped.
  pub fn content(&self) -> &'a [u8] {
    strip_terminator(self.bytes)
  }

  pub fn text(&self) -> std::borrow::Cow<'a, str> {
    String::from_utf8_lossy(self.content())
  }
}

fn strip_terminator(bytes: &[u8]) -> &[u8] {
  match bytes {
    [head @ .., b'\r', b'\n'] => head,
    [head @ .., b'\n'] | [head @ .., b'\r'] => head,
    _ => bytes,
  }
}

/// Bounded-memory bidirectional line access into a text file of arbitrary
/// size, including files still being appended to by another process.
///
/// The reader keeps a fixed-capacity window mapped onto a byte range of the
/// file and slides it as the cursor moves. Nothing outside the window is ever
/// held in memory, so files may be far larger than the configured capacity.
/// Not for shared use from multiple threads; independent readers over the
/// same path are fine.
pub struct FileReader {
  path: PathBuf,
  options: ReaderOptions,
  capacity: usize,
  max_line_size: usize,
  buffer: Vec<u8>,
  file: Option<File>,
  file_size: Option<u64>,
  /// Absolute file offset of the window's first byte. None until first use.
  buffer_file_offset: Option<u64>,
  /// Window-relative range currently holding bytes read from disk.
  data: Option<Range<usize>>,
  /// Window-relative navigation position, in `[0, capacity]`.
  cursor: usize,
  line_span: Option<LineSpan>,
  snapshot: Option<TailSnapshot>,
  lines_read: u64,
  bytes_read: u64,
}

impl FileReader {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self::with_options(path, ReaderOptions::default())
  }

  pub fn with_options(path: impl AsRef<Path>, options: ReaderOptions) -> Self {
    assert!(
      options.buffer_capacity >= 4 && options.buffer_capacity % 2 == 0,
      "buffer capacity must be an even number of bytes"
    );
    let capacity = options.buffer_capacity;
    Self {
      path: path.as_ref().to_path_buf(),
      capacity,
      max_line_size: capacity / 2,
      buffer: vec![0; capacity],
      file: None,
      file_size: None,
      buffer_file_offset: None,
      data: None,
      cursor: 0,
      line_span: None,
      snapshot: None,
      lines_read: 0,
      bytes_read: 0,
      options,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn max_line_size(&self) -> usize {
    self.max_line_size
  }

  pub fn lines_read(&self) -> u64 {
    self.lines_read
  }

  pub fn bytes_read(&self) -> u64 {
    self.bytes_read
  }

  /// Span of the most recently returned line, if any.
  pub fn current_line_span(&self) -> Option<LineSpan> {
    self.line_span
  }

  /// Size of the file as last observed. Opens the file on first use.
  pub fn file_size(&mut self) -> Result<u64, ReaderError> {
    self.ensure_open()?;
    Ok(self.file_size.unwrap_or(0))
  }

  /// Moves the cursor to `offset`. The target byte is not required to be
  /// loaded yet; it is fetched on demand by the next navigation call. When
  /// the window must be re-centered, the part of the loaded region that
  /// overlaps the new window is relocated instead of re-read.
  pub fn seek(&mut self, offset: u64) -> Result<(), ReaderError> {
    self.seek_with_margin(offset, 0)
  }

  /// Returns the next line and leaves the cursor at its end, or `None` once
  /// the end of the file is reached. A final line without a terminator is
  /// returned as well, with the end of file closing its span.
  pub fn next_line(&mut self) -> Result<Option<Line<'_>>, ReaderError> {
    self.ensure_open()?;
    self.fill_buffer(true)?;

    // When starting in the middle of a line, move to its end first.
    if !self.cursor_at_line_start()? {
      match self.find_next_line_start(self.cursor)? {
        Some(index) => self.set_cursor(index),
        None => {
          self.line_span = None;
          return Ok(None);
        }
      }
    }

    let start_offset = self.index_to_offset(self.cursor);
    match self.find_next_line_start(self.cursor)? {
      Some(index) => {
        self.set_cursor(index);
        let end_offset = self.index_to_offset(index);
        self.finish_line(LineSpan { start: start_offset, end: end_offset })
      }
      None => {
        self.line_span = None;
        Ok(None)
      }
    }
  }

  /// Returns the previous line and leaves the cursor at its start, or `None`
  /// once the beginning of the file is reached. Starting from the middle of
  /// a line skips back over the partial text to the preceding full line.
  pub fn previous_line(&mut self) -> Result<Option<Line<'_>>, ReaderError> {
    self.ensure_open()?;
    self.fill_buffer(false)?;

    if !self.cursor_at_line_start()? {
      match self.find_previous_line_start(self.cursor)? {
        Some(index) => self.set_cursor(index),
        None => {
          self.line_span = None;
          return Ok(None);
        }
      }
    }

    let end_offset = self.index_to_offset(self.cursor);
    match self.find_previous_line_start(self.cursor)? {
      Some(index) => {
        self.set_cursor(index);
        let start_offset = self.index_to_offset(index);
        self.finish_line(LineSpan { start: start_offset, end: end_offset })
      }
      None => {
        self.line_span = None;
        Ok(None)
      }
    }
  }

  pub fn first_line(&mut self) -> Result<Option<Line<'_>>, ReaderError> {
    self.seek(0)?;
    self.next_line()
  }

  pub fn last_line(&mut self) -> Result<Option<Line<'_>>, ReaderError> {
    let file_size = self.file_size()?;
    self.seek(file_size)?;
    self.previous_line()
  }

  /// Scans forward line by line for the first line whose content contains
  /// `needle`. Case-insensitive matching folds ASCII only, in line with the
  /// byte-oriented text model. An empty needle matches every line.
  pub fn find_next_line_containing(
    &mut self,
    needle: &str,
    case_sensitive: bool,
  ) -> Result<Option<LineSpan>, ReaderError> {
    let matcher = LineMatcher::new(needle.as_bytes(), case_sensitive);
    loop {
      let hit = match self.next_line()? {
        Some(line) => matcher.matches(line.content()).then(|| line.span()),
        None => return Ok(None),
      };
      if hit.is_some() {
        return Ok(hit);
      }
    }
  }

  pub fn find_previous_line_containing(
    &mut self,
    needle: &str,
    case_sensitive: bool,
  ) -> Result<Option<LineSpan>, ReaderError> {
    let matcher = LineMatcher::new(needle.as_bytes(), case_sensitive);
    loop {
      let hit = match self.previous_line()? {
        Some(line) => matcher.matches(line.content()).then(|| line.span()),
        None => return Ok(None),
      };
      if hit.is_some() {
        return Ok(hit);
      }
    }
  }

  /// True iff `offset` begins a line: offset 0, or the byte before it ends a
  /// line. A `\r` directly followed by `\n` is the middle of one terminator,
  /// not a line boundary. Bytes outside the loaded region are fetched with
  /// single direct reads that leave the window untouched.
  pub fn is_line_start(&mut self, offset: u64) -> Result<bool, ReaderError> {
    let file_size = self.file_size()?;
    if offset > file_size {
      return Err(ReaderError::InvalidOffset { offset, file_size });
    }
    if offset == 0 {
      return Ok(true);
    }
    match self.byte_at(offset - 1)? {
      b'\n' => Ok(true),
      b'\r' => {
        if offset == file_size {
          Ok(true)
        } else {
          Ok(self.byte_at(offset)? != b'\n')
        }
      }
      _ => Ok(false),
    }
  }

  /// Classifies external mutation since the last observation, refreshes the
  /// tail snapshot, and drops the loaded region on any change. Equal sizes
  /// always classify as `Unchanged`: same-size in-place edits go undetected
  /// (an accepted limitation of the size heuristic).
  pub fn check_file_for_changes(&mut self) -> Result<FileChange, ReaderError> {
    self.ensure_open()?;
    let new_size = self.stat_size()?;
    let Some(snapshot) = self.snapshot.as_ref() else {
      return Err(ReaderError::Internal("change check without a snapshot"));
    };
    if new_size == snapshot.file_size() {
      return Ok(FileChange::Unchanged);
    }
    let Some(file) = self.file.as_mut() else {
      return Err(ReaderError::Internal("change check on a closed file"));
    };
    let change = snapshot.classify(file, new_size)?;
    debug!(old_size = snapshot.file_size(), new_size, ?change, "file changed on disk");
    self.data = None;
    self.file_size = Some(new_size);
    self.refresh_snapshot()?;
    Ok(change)
  }

  /// Checks the window/loaded-region/cursor invariants. Meant for tests and
  /// debug builds; never needed on the hot path.
  pub fn validate(&self) -> Result<(), ReaderError> {
    self.validate_with_cursor(false)
  }

  fn validate_with_cursor(&self, cursor_in_data: bool) -> Result<(), ReaderError> {
    if self.buffer.len() != self.capacity {
      return Err(ReaderError::Internal("window buffer lost its capacity"));
    }
    if self.cursor > self.capacity {
      return Err(ReaderError::Internal("cursor past the window end"));
    }
    if let Some(d) = &self.data {
      if d.start > d.end || d.end > self.capacity {
        return Err(ReaderError::Internal("loaded region outside the window"));
      }
      if let (Some(base), Some(size)) = (self.buffer_file_offset, self.file_size) {
        if base + d.end as u64 > size {
          return Err(ReaderError::Internal("loaded region past the end of file"));
        }
      }
      if cursor_in_data && (self.cursor < d.start || self.cursor > d.end) {
        return Err(ReaderError::Internal("cursor outside the loaded region"));
      }
    }
    Ok(())
  }

  fn debug_validate(&self, cursor_in_data: bool) {
    if cfg!(debug_assertions) {
      if let Err(e) = self.validate_with_cursor(cursor_in_data) {
        panic!("{e}");
      }
    }
  }

  fn ensure_open(&mut self) -> Result<(), ReaderError> {
    if self.file.is_some() {
      return Ok(());
    }
    let file = File::open(&self.path)?;
    let size = file.metadata()?.len();
    self.file = Some(file);
    self.file_size = Some(size);
    self.refresh_snapshot()?;
    if self.buffer_file_offset.is_none() {
      self.seek(0)?;
    }
    Ok(())
  }

  fn refresh_snapshot(&mut self) -> Result<(), ReaderError> {
    let size = self.file_size.unwrap_or(0);
    let Some(file) = self.file.as_mut() else {
      return Err(ReaderError::Internal("snapshot of a closed file"));
    };
    self.snapshot = Some(TailSnapshot::capture(file, size, self.capacity)?);
    Ok(())
  }

  fn stat_size(&self) -> Result<u64, ReaderError> {
    let Some(file) = self.file.as_ref() else {
      return Err(ReaderError::Internal("stat of a closed file"));
    };
    Ok(file.metadata()?.len())
  }

  fn window_offset(&self) -> u64 {
    debug_assert!(self.buffer_file_offset.is_some(), "window not anchored");
    self.buffer_file_offset.unwrap_or(0)
  }

  fn index_to_offset(&self, index: usize) -> u64 {
    debug_assert!(index <= self.capacity);
    self.window_offset() + index as u64
  }

  fn index_of(&self, offset: u64) -> Option<usize> {
    let base = self.buffer_file_offset?;
    if offset < base || offset > base + self.capacity as u64 {
      return None;
    }
    Some((offset - base) as usize)
  }

  fn offset_to_index(&self, offset: u64) -> usize {
    let base = self.window_offset();
    debug_assert!(offset >= base && offset <= base + self.capacity as u64);
    offset.saturating_sub(base) as usize
  }

  fn set_cursor(&mut self, index: usize) {
    self.cursor = index;
    self.debug_validate(false);
  }

  fn cursor_at_line_start(&mut self) -> Result<bool, ReaderError> {
    let offset = self.index_to_offset(self.cursor);
    self.is_line_start(offset)
  }

  // Window byte when loaded, single direct read otherwise.
  fn byte_at(&mut self, offset: u64) -> Result<u8, ReaderError> {
    if let (Some(base), Some(d)) = (self.buffer_file_offset, self.data.clone()) {
      if offset >= base + d.start as u64 && offset < base + d.end as u64 {
        return Ok(self.buffer[(offset - base) as usize]);
      }
    }
    let Some(file) = self.file.as_mut() else {
      return Err(ReaderError::Internal("read on a closed file"));
    };
    file.seek(SeekFrom::Start(offset))?;
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte)?;
    Ok(byte[0])
  }

  fn seek_with_margin(&mut self, offset: u64, margin: usize) -> Result<(), ReaderError> {
    self.debug_validate(false);
    let file_size = self.file_size()?;
    if offset > file_size {
      return Err(ReaderError::InvalidOffset { offset, file_size });
    }

    // Already in the window with enough slack: reposition the cursor only.
    if let Some(base) = self.buffer_file_offset {
      if base + margin as u64 <= offset && offset <= base + (self.capacity - margin) as u64 {
        let index = self.offset_to_index(offset);
        self.set_cursor(index);
        return Ok(());
      }
    }

    let new_base = u64::min(
      file_size.saturating_sub(self.capacity as u64),
      offset.saturating_sub(self.capacity as u64 / 2),
    );
    let new_cursor = (offset - new_base) as usize;
    trace!(offset, new_base, "re-centering window");

    // Keep whatever part of the old loaded region overlaps the new window,
    // relocated to its new position. memmove semantics via copy_within.
    let relocated = match (self.buffer_file_offset, self.data.clone()) {
      (Some(old_base), Some(d)) if d.start < d.end => {
        let old_begin = old_base + d.start as u64;
        let old_end = old_base + d.end as u64;
        let new_window_end = new_base + self.capacity as u64;
        let keep_begin = old_begin.clamp(new_base, new_window_end);
        let keep_end = old_end.clamp(new_base, new_window_end);
        if keep_begin < keep_end {
          let src = (keep_begin - old_base) as usize;
          let len = (keep_end - keep_begin) as usize;
          let dest = (keep_begin - new_base) as usize;
          if src != dest {
            self.buffer.copy_within(src..src + len, dest);
          }
          Some(dest..dest + len)
        } else {
          None
        }
      }
      _ => None,
    };

    self.buffer_file_offset = Some(new_base);
    self.data = Some(relocated.unwrap_or(new_cursor..new_cursor));
    self.set_cursor(new_cursor);
    self.debug_validate(false);
    Ok(())
  }

  /// Reads the minimal unread run on the `forward` side of the cursor into
  /// the window and extends the loaded region over it.
  fn fill_buffer(&mut self, forward: bool) -> Result<(), ReaderError> {
    self.debug_validate(false);
    let file_size = self.file_size.unwrap_or(0);
    let base = self.window_offset();

    let (mut start, mut len) = match self.data.clone() {
      None => (0, self.capacity),
      Some(d) if forward => {
        if self.cursor < d.start {
          (self.cursor, d.start - self.cursor)
        } else {
          (d.end, self.capacity - d.end)
        }
      }
      Some(d) => {
        if self.cursor > d.end {
          (d.end, self.cursor - d.end)
        } else {
          (0, d.start)
        }
      }
    };

    let run_offset = base + start as u64;
    len = len.min(file_size.saturating_sub(run_offset).min(self.capacity as u64) as usize);

    // A forward fill about to conclude end-of-file from the cached size must
    // re-check first, otherwise appended data is never noticed.
    let at_cached_eof = forward && len == 0 && self.cursor == start && run_offset >= file_size;

    if self.options.check_file_for_changes
      && (len > 0 || at_cached_eof)
      && self.snapshot.is_some()
    {
      let change = self.check_file_for_changes()?;
      if change != FileChange::Unchanged {
        self.signal_file_change(change)?;
        // The window content is stale: re-read the whole window against the
        // new file size.
        let new_size = self.file_size.unwrap_or(0);
        start = 0;
        len = new_size.saturating_sub(base).min(self.capacity as u64) as usize;
      }
    }

    let had_data = self.data.clone().filter(|d| d.start < d.end);
    if len > 0 {
      let file_offset = base + start as u64;
      let Some(file) = self.file.as_mut() else {
        return Err(ReaderError::Internal("fill on a closed file"));
      };
      file.seek(SeekFrom::Start(file_offset))?;
      file.read_exact(&mut self.buffer[start..start + len])?;
      trace!(file_offset, len, "filled window");

      self.data = Some(match had_data {
        None => start..start + len,
        Some(d) if forward => {
          if self.cursor < d.start {
            self.cursor..d.end
          } else {
            d.start..start + len
          }
        }
        Some(d) => {
          if self.cursor > d.end {
            d.start..self.cursor
          } else {
            0..d.end
          }
        }
      });
      self.bytes_read += len as u64;
    }

    self.debug_validate(true);
    Ok(())
  }

  fn signal_file_change(&mut self, change: FileChange) -> Result<(), ReaderError> {
    match change {
      FileChange::Unchanged => Ok(()),
      FileChange::Appended => {
        if self.options.ignore_append_changes {
          Ok(())
        } else {
          Err(ReaderError::FileAppended)
        }
      }
      FileChange::Overwritten => {
        // Offsets stay file-absolute, but cached position semantics are gone:
        // drop the span and re-anchor the cursor inside the new file bounds
        // so a fresh seek resumes cleanly.
        let new_size = self.file_size.unwrap_or(0);
        let cursor_offset = self.index_to_offset(self.cursor).min(new_size);
        self.line_span = None;
        self.seek_with_margin(cursor_offset, 0)?;
        Err(ReaderError::FileOverwritten)
      }
    }
  }

  /// Index of the first line start at or after `start`, `None` once the end
  /// of the file is reached. Explicit two-attempt loop: the initial scan plus
  /// at most one refill-and-retry centered at the unresolved position, which
  /// always moves the window toward unread data.
  fn find_next_line_start(&mut self, start: usize) -> Result<Option<usize>, ReaderError> {
    let mut from = start;
    for attempt in 0..2 {
      let file_size = self.file_size.unwrap_or(0);
      let d = self.data.clone().unwrap_or(self.cursor..self.cursor);

      let mut s = from;
      while s < d.end && self.buffer[s] != b'\r' && self.buffer[s] != b'\n' {
        s += 1;
      }
      if s < d.end && self.buffer[s] == b'\r' {
        s += 1;
      }
      if s < d.end && self.buffer[s] == b'\n' {
        s += 1;
      }
      if s < d.end {
        return Ok(Some(s));
      }

      // The scan ran into the edge of the loaded region.
      let stuck_offset = self.index_to_offset(s);
      let from_offset = self.index_to_offset(from);
      if s != from && self.is_line_start(stuck_offset)? {
        // The line ends exactly at the loaded edge.
        return Ok(Some(s));
      }
      if from_offset == file_size {
        return Ok(None);
      }
      if attempt == 0 {
        self.seek_with_margin(stuck_offset, self.max_line_size)?;
        self.fill_buffer(true)?;
        from = match self.index_of(from_offset) {
          Some(index) => index,
          None => return Err(ReaderError::LineTooLong { max: self.max_line_size }),
        };
        continue;
      }
      if stuck_offset == file_size {
        // No terminator before true end of file: the final line ends there.
        return Ok(Some(s));
      }
      return Err(ReaderError::LineTooLong { max: self.max_line_size });
    }
    Err(ReaderError::Internal("forward scan failed to make progress"))
  }

  /// Backward counterpart of `find_next_line_start`, with the symmetric edge
  /// case: a file that starts without a preceding terminator still has a
  /// first line at offset 0.
  fn find_previous_line_start(&mut self, start: usize) -> Result<Option<usize>, ReaderError> {
    let mut from = start;
    for attempt in 0..2 {
      let d = self.data.clone().unwrap_or(self.cursor..self.cursor);

      let mut s = from;
      if s > d.start && self.buffer[s - 1] == b'\n' {
        s -= 1;
      }
      if s > d.start && self.buffer[s - 1] == b'\r' {
        s -= 1;
      }
      while s > d.start && self.buffer[s - 1] != b'\r' && self.buffer[s - 1] != b'\n' {
        s -= 1;
      }
      if s > d.start {
        return Ok(Some(s));
      }

      // The scan ran into the start of the loaded region.
      let stuck_offset = self.index_to_offset(s);
      let from_offset = self.index_to_offset(from);
      if s != from && self.is_line_start(stuck_offset)? {
        // The line starts exactly at the loaded edge.
        return Ok(Some(s));
      }
      if from_offset == 0 {
        return Ok(None);
      }
      if attempt == 0 {
        self.seek_with_margin(stuck_offset, self.max_line_size)?;
        self.fill_buffer(false)?;
        from = match self.index_of(from_offset) {
          Some(index) => index,
          None => return Err(ReaderError::LineTooLong { max: self.max_line_size }),
        };
        continue;
      }
      if stuck_offset == 0 {
        // Reached the start of the file without a terminator: implicit first
        // line.
        return Ok(Some(s));
      }
      return Err(ReaderError::LineTooLong { max: self.max_line_size });
    }
    Err(ReaderError::Internal("backward scan failed to make progress"))
  }

  fn finish_line(&mut self, span: LineSpan) -> Result<Option<Line<'_>>, ReaderError> {
    let start = self.offset_to_index(span.start);
    let end = self.offset_to_index(span.end);
    let content_len = strip_terminator(&self.buffer[start..end]).len();
    if content_len > self.max_line_size {
      self.line_span = None;
      return Err(ReaderError::LineTooLong { max: self.max_line_size });
    }
    self.line_span = Some(span);
    self.lines_read += 1;
    Ok(Some(Line { bytes: &self.buffer[start..end], span }))
  }
}
