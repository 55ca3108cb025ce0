use std::io::Write;
use std::path::{Path, PathBuf};

use ll_core::{FileChange, FileReader, LineSpan, ReaderError, ReaderOptions};

fn write_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
  let path = dir.path().join(name);
  std::fs::write(&path, bytes).unwrap();
  path
}

fn reader_with_capacity(path: &Path, capacity: usize) -> FileReader {
  FileReader::with_options(
    path,
    ReaderOptions {
      buffer_capacity: capacity,
      ..ReaderOptions::default()
    },
  )
}

fn collect_forward(reader: &mut FileReader) -> (Vec<LineSpan>, Vec<String>, Vec<u8>) {
  reader.seek(0).unwrap();
  let mut spans = Vec::new();
  let mut texts = Vec::new();
  let mut raw = Vec::new();
  loop {
    match reader.next_line().unwrap() {
      Some(line) => {
        spans.push(line.span());
        texts.push(line.text().into_owned());
        raw.extend_from_slice(line.raw());
      }
      None => break,
    }
  }
  (spans, texts, raw)
}

fn collect_backward(reader: &mut FileReader) -> (Vec<LineSpan>, Vec<String>) {
  let size = reader.file_size().unwrap();
  reader.seek(size).unwrap();
  let mut spans = Vec::new();
  let mut texts = Vec::new();
  loop {
    match reader.previous_line().unwrap() {
      Some(line) => {
        spans.push(line.span());
        texts.push(line.text().into_owned());
      }
      None => break,
    }
  }
  (spans, texts)
}

#[test]
fn forward_traversal_reconstructs_file() {
  let dir = tempfile::tempdir().unwrap();
  let content: String = (0..200).map(|i| format!("line number {i}\n")).collect();
  let path = write_file(&dir, "a.log", content.as_bytes());

  // Window much smaller than the file so it has to slide.
  let mut reader = reader_with_capacity(&path, 128);
  let (spans, texts, raw) = collect_forward(&mut reader);

  assert_eq!(texts.len(), 200);
  assert_eq!(texts[0], "line number 0");
  assert_eq!(texts[199], "line number 199");
  assert_eq!(raw, content.as_bytes());
  assert_eq!(reader.lines_read(), 200);

  // Spans tile the file without gaps or overlaps.
  assert_eq!(spans[0].start, 0);
  for pair in spans.windows(2) {
    assert_eq!(pair[0].end, pair[1].start);
  }
  assert_eq!(spans.last().unwrap().end, content.len() as u64);
  reader.validate().unwrap();
}

#[test]
fn backward_traversal_reverses_forward_order() {
  let dir = tempfile::tempdir().unwrap();
  let content: String = (0..150).map(|i| format!("entry {i:04}\n")).collect();
  let path = write_file(&dir, "a.log", content.as_bytes());

  let mut reader = reader_with_capacity(&path, 128);
  let (forward_spans, forward_texts, _) = collect_forward(&mut reader);
  let (mut back_spans, mut back_texts) = collect_backward(&mut reader);
  back_spans.reverse();
  back_texts.reverse();

  assert_eq!(back_spans, forward_spans);
  assert_eq!(back_texts, forward_texts);
}

#[test]
fn returned_span_starts_are_line_starts() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_file(&dir, "a.log", b"alpha\nbravo\r\ncharlie\rdelta\r\necho\n");

  let mut reader = reader_with_capacity(&path, 64);
  let (spans, _, _) = collect_forward(&mut reader);
  for span in &spans {
    assert!(reader.is_line_start(span.start).unwrap(), "offset {}", span.start);
  }
  // A mid-line offset is not a line start.
  assert!(!reader.is_line_start(spans[0].start + 2).unwrap());
}

#[test]
fn seek_then_next_line_is_history_independent() {
  let dir = tempfile::tempdir().unwrap();
  let content: String = (0..80).map(|i| format!("record {i:03}\n")).collect();
  let path = write_file(&dir, "a.log", content.as_bytes());
  let size = content.len() as u64;

  let next_after_seek = |reader: &mut FileReader, k: u64| {
    reader.seek(k).unwrap();
    reader
      .next_line()
      .unwrap()
      .map(|line| (line.span(), line.text().into_owned()))
  };

  for k in [0, 3, 11, 120, size / 2, size - 1, size] {
    let mut fresh = reader_with_capacity(&path, 128);
    let expected = next_after_seek(&mut fresh, k);

    // Same seek after a completely different navigation history.
    let mut navigated = reader_with_capacity(&path, 128);
    let _ = navigated.last_line().unwrap();
    let _ = navigated.previous_line().unwrap();
    let _ = navigated.first_line().unwrap();
    assert_eq!(next_after_seek(&mut navigated, k), expected, "k={k}");
  }
}

#[test]
fn mixed_terminators_split_identically() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_file(&dir, "a.log", b"alpha\nbravo\r\ncharlie\rdelta\r\necho\n");
  let expected = ["alpha", "bravo", "charlie", "delta", "echo"];

  // Once with the whole file in the window, once with a window so small the
  // terminators straddle its edges.
  for capacity in [64, 16] {
    let mut reader = reader_with_capacity(&path, capacity);
    let (_, texts, raw) = collect_forward(&mut reader);
    assert_eq!(texts, expected, "capacity={capacity}");
    assert_eq!(raw, b"alpha\nbravo\r\ncharlie\rdelta\r\necho\n");

    let (_, mut back) = collect_backward(&mut reader);
    back.reverse();
    assert_eq!(back, expected, "capacity={capacity}");
  }
}

#[test]
fn crlf_straddling_the_window_edge() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_file(&dir, "a.log", b"ab\r\ncd\r\nef\r\n");

  let mut reader = reader_with_capacity(&path, 8);
  let (_, texts, raw) = collect_forward(&mut reader);
  assert_eq!(texts, ["ab", "cd", "ef"]);
  assert_eq!(raw, b"ab\r\ncd\r\nef\r\n");

  let (_, mut back) = collect_backward(&mut reader);
  back.reverse();
  assert_eq!(back, ["ab", "cd", "ef"]);
}

#[test]
fn lone_carriage_returns_terminate_lines() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_file(&dir, "a.log", b"a\rb\rc");

  let mut reader = reader_with_capacity(&path, 64);
  let (_, texts, _) = collect_forward(&mut reader);
  assert_eq!(texts, ["a", "b", "c"]);
}

#[test]
fn line_of_exactly_half_the_capacity_succeeds() {
  let dir = tempfile::tempdir().unwrap();
  let mut content = vec![b'x'; 32];
  content.push(b'\n');
  let path = write_file(&dir, "a.log", &content);

  let mut reader = reader_with_capacity(&path, 64);
  {
    let line = reader.first_line().unwrap().unwrap();
    assert_eq!(line.content().len(), 32);
  }
  let line = reader.last_line().unwrap().unwrap();
  assert_eq!(line.content().len(), 32);
}

#[test]
fn line_longer_than_half_the_capacity_fails_both_ways() {
  let dir = tempfile::tempdir().unwrap();
  let mut content = vec![b'x'; 33];
  content.push(b'\n');
  let path = write_file(&dir, "a.log", &content);

  let mut reader = reader_with_capacity(&path, 64);
  assert!(matches!(
    reader.first_line(),
    Err(ReaderError::LineTooLong { max: 32 })
  ));
  assert!(matches!(
    reader.last_line(),
    Err(ReaderError::LineTooLong { max: 32 })
  ));

  // The unterminated variant fails the same way.
  let path = write_file(&dir, "b.log", &vec![b'y'; 33]);
  let mut reader = reader_with_capacity(&path, 64);
  assert!(matches!(
    reader.first_line(),
    Err(ReaderError::LineTooLong { max: 32 })
  ));
}

#[test]
fn appended_lines_are_picked_up_by_default() {
  let dir = tempfile::tempdir().unwrap();
  let content: String = (0..1000).map(|i| format!("row {i:04}\n")).collect();
  let path = write_file(&dir, "a.log", content.as_bytes());

  let mut reader = reader_with_capacity(&path, 512);
  let (_, texts, _) = collect_forward(&mut reader);
  assert_eq!(texts.len(), 1000);

  // Another process appends while we sit at the end.
  let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
  for i in 1000..1010 {
    write!(file, "row {i:04}\n").unwrap();
  }
  drop(file);

  for i in 1000..1010 {
    let text = reader.next_line().unwrap().map(|l| l.text().into_owned());
    assert_eq!(text.as_deref(), Some(format!("row {i:04}").as_str()));
  }
  assert!(reader.next_line().unwrap().is_none());
}

#[test]
fn append_is_surfaced_when_not_ignored() {
  let dir = tempfile::tempdir().unwrap();
  let content: String = (0..100).map(|i| format!("row {i:03}\n")).collect();
  let path = write_file(&dir, "a.log", content.as_bytes());

  let mut reader = FileReader::with_options(
    &path,
    ReaderOptions {
      buffer_capacity: 256,
      ignore_append_changes: false,
      ..ReaderOptions::default()
    },
  );
  let (_, texts, _) = collect_forward(&mut reader);
  assert_eq!(texts.len(), 100);

  let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
  write!(file, "row 100\n").unwrap();
  drop(file);

  assert!(matches!(reader.next_line(), Err(ReaderError::FileAppended)));

  // The condition is recoverable: the next call proceeds with the new data.
  let text = reader.next_line().unwrap().map(|l| l.text().into_owned());
  assert_eq!(text.as_deref(), Some("row 100"));
}

#[test]
fn overwrite_is_detected_on_the_next_refill() {
  let dir = tempfile::tempdir().unwrap();
  let content: String = (0..100).map(|i| format!("entry {i:03}\n")).collect();
  let path = write_file(&dir, "a.log", content.as_bytes());

  let mut reader = reader_with_capacity(&path, 256);
  assert!(reader.first_line().unwrap().is_some());

  // The file shrinks behind our back.
  let replacement: String = (0..50).map(|i| format!("other {i:03}\n")).collect();
  std::fs::write(&path, replacement.as_bytes()).unwrap();

  // Jump outside the loaded window so the next read has to hit the disk.
  reader.seek(600).unwrap();
  assert!(matches!(
    reader.next_line(),
    Err(ReaderError::FileOverwritten)
  ));

  // The reader stays usable: a fresh seek reads the new content.
  reader.seek(0).unwrap();
  let text = reader.next_line().unwrap().map(|l| l.text().into_owned());
  assert_eq!(text.as_deref(), Some("other 000"));
  reader.validate().unwrap();
}

#[test]
fn grown_file_with_rewritten_tail_is_an_overwrite() {
  let dir = tempfile::tempdir().unwrap();
  let content: String = (0..100).map(|i| format!("entry {i:03}\n")).collect();
  let path = write_file(&dir, "a.log", content.as_bytes());

  let mut reader = reader_with_capacity(&path, 256);
  assert!(reader.first_line().unwrap().is_some());

  // Larger than before, but the old tail bytes are gone: not an append.
  let replacement: String = (0..120).map(|i| format!("fresh {i:03}\n")).collect();
  std::fs::write(&path, replacement.as_bytes()).unwrap();

  reader.seek(900).unwrap();
  assert!(matches!(
    reader.next_line(),
    Err(ReaderError::FileOverwritten)
  ));
}

#[test]
fn same_size_in_place_edit_goes_undetected() {
  // Documented limitation of the size heuristic: equal size classifies as
  // unchanged and the window keeps serving stale bytes.
  let dir = tempfile::tempdir().unwrap();
  let path = write_file(&dir, "a.log", b"aaaa\nbbbb\ncccc\n");

  let mut reader = reader_with_capacity(&path, 64);
  let text = reader.first_line().unwrap().map(|l| l.text().into_owned());
  assert_eq!(text.as_deref(), Some("aaaa"));

  let mut edited = b"aaaa\nbbbb\ncccc\n".to_vec();
  edited[5..9].copy_from_slice(b"XXXX");
  std::fs::write(&path, &edited).unwrap();

  assert_eq!(
    reader.check_file_for_changes().unwrap(),
    FileChange::Unchanged
  );
  let text = reader.next_line().unwrap().map(|l| l.text().into_owned());
  assert_eq!(text.as_deref(), Some("bbbb"));

  // A new reader sees the edited bytes.
  let mut fresh = reader_with_capacity(&path, 64);
  fresh.seek(5).unwrap();
  let text = fresh.next_line().unwrap().map(|l| l.text().into_owned());
  assert_eq!(text.as_deref(), Some("XXXX"));
}

#[test]
fn search_finds_the_single_matching_line() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_file(&dir, "a.log", b"alpha\nbravo\nthe needle is here\ndelta\n");
  let expected = LineSpan { start: 12, end: 31 };

  let mut reader = reader_with_capacity(&path, 64);
  reader.seek(0).unwrap();
  let span = reader.find_next_line_containing("needle", true).unwrap();
  assert_eq!(span, Some(expected));
  assert_eq!(reader.current_line_span(), Some(expected));

  // Case folding only applies when asked for.
  reader.seek(0).unwrap();
  assert_eq!(reader.find_next_line_containing("NEEDLE", true).unwrap(), None);
  reader.seek(0).unwrap();
  assert_eq!(
    reader.find_next_line_containing("NEEDLE", false).unwrap(),
    Some(expected)
  );

  // Backward from the end lands on the same line.
  let size = reader.file_size().unwrap();
  reader.seek(size).unwrap();
  assert_eq!(
    reader.find_previous_line_containing("needle", true).unwrap(),
    Some(expected)
  );

  // A full scan with no match returns none without an error.
  reader.seek(0).unwrap();
  assert_eq!(reader.find_next_line_containing("missing", true).unwrap(), None);
}

#[test]
fn empty_file_has_no_lines() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_file(&dir, "a.log", b"");

  let mut reader = reader_with_capacity(&path, 64);
  assert_eq!(reader.file_size().unwrap(), 0);
  assert!(reader.first_line().unwrap().is_none());
  assert!(reader.last_line().unwrap().is_none());
  assert_eq!(reader.current_line_span(), None);
}

#[test]
fn final_line_without_terminator_is_returned_forward() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_file(&dir, "a.log", b"one\ntwo\nthree");

  let mut reader = reader_with_capacity(&path, 64);
  let (spans, texts, raw) = collect_forward(&mut reader);
  assert_eq!(texts, ["one", "two", "three"]);
  assert_eq!(raw, b"one\ntwo\nthree");
  assert_eq!(spans.last(), Some(&LineSpan { start: 8, end: 13 }));

  // Backward navigation skips the partial tail and starts at the previous
  // full line.
  let (_, mut back) = collect_backward(&mut reader);
  back.reverse();
  assert_eq!(back, ["one", "two"]);
}

#[test]
fn seek_outside_the_file_is_rejected() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_file(&dir, "a.log", b"abc\ndef\n");

  let mut reader = reader_with_capacity(&path, 64);
  assert!(matches!(
    reader.seek(9),
    Err(ReaderError::InvalidOffset { offset: 9, file_size: 8 })
  ));

  // No state was disturbed.
  let text = reader.next_line().unwrap().map(|l| l.text().into_owned());
  assert_eq!(text.as_deref(), Some("abc"));
}

#[test]
fn read_counters_track_work() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_file(&dir, "a.log", b"aaa\nbbb\n");

  let mut reader = reader_with_capacity(&path, 64);
  let (_, texts, _) = collect_forward(&mut reader);
  assert_eq!(texts.len(), 2);
  assert_eq!(reader.lines_read(), 2);
  // The whole file fits in the window, so it is read exactly once.
  assert_eq!(reader.bytes_read(), 8);

  // A no-more-lines probe does not count as a read line.
  assert!(reader.next_line().unwrap().is_none());
  assert_eq!(reader.lines_read(), 2);
}

#[test]
fn missing_file_reports_io_error_and_recovers() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("late.log");

  let mut reader = reader_with_capacity(&path, 64);
  assert!(matches!(reader.first_line(), Err(ReaderError::Io(_))));

  // The file shows up later; the same reader picks it up.
  std::fs::write(&path, b"hello\n").unwrap();
  let text = reader.first_line().unwrap().map(|l| l.text().into_owned());
  assert_eq!(text.as_deref(), Some("hello"));
}
