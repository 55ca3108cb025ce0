use ll_core::{CoreEngine, CoreOptions};

fn main() -> Result<(), String> {
  let path = std::env::args()
    .nth(1)
    .ok_or_else(|| "usage: cargo run --example smoke_open -- <path-to-log>".to_string())?;

  let eng = CoreEngine::new(CoreOptions {
    default_page_size: 5,
    ..CoreOptions::default()
  });

  let (session, mut page) = eng.open_file(&path).map_err(|e| e.to_string())?;
  println!("file_size={}", session.file_size);

  loop {
    for r in &page.records {
      let line_no = r.line_no.map(|n| n.to_string()).unwrap_or_default();
      println!("{:>6} [{}..{}) {}", line_no, r.span.start, r.span.end, r.text);
    }
    let Some(cursor) = page.next_cursor.clone() else {
      break;
    };
    page = eng
      .next_page(&session.session_id, Some(&cursor), 5)
      .map_err(|e| e.to_string())?;
    if page.records.is_empty() {
      break;
    }
  }
  Ok(())
}
