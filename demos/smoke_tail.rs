use std::{thread, time::Duration};

use ll_core::{CoreEngine, CoreOptions};

fn main() -> Result<(), String> {
  let path = std::env::args()
    .nth(1)
    .ok_or_else(|| "usage: cargo run --example smoke_tail -- <path-to-log>".to_string())?;

  let eng = CoreEngine::new(CoreOptions::default());
  let (session, _first) = eng.open_file(&path).map_err(|e| e.to_string())?;

  // Print the last ten lines, then follow appends.
  let tail = eng
    .previous_page(&session.session_id, None, 10)
    .map_err(|e| e.to_string())?;
  for r in &tail.records {
    println!("{}", r.text);
  }

  let mut cursor = eng
    .cursor_for_offset(&session.session_id, session.file_size)
    .map_err(|e| e.to_string())?;
  loop {
    let page = eng
      .next_page(&session.session_id, Some(&cursor), 50)
      .map_err(|e| e.to_string())?;
    for r in &page.records {
      println!("{}", r.text);
    }
    match page.records.last() {
      Some(last) => {
        cursor = eng
          .cursor_for_offset(&session.session_id, last.span.end)
          .map_err(|e| e.to_string())?;
      }
      None => thread::sleep(Duration::from_millis(500)),
    }
  }
}
