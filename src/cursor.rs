use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::engine::CoreError;

/// Opaque paging position: a byte offset plus the absolute line number when
/// it is known (forward paging from the start of the file).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct Cursor {
  pub offset: u64,
  pub line: Option<u64>,
}

pub(crate) fn encode_cursor(c: Cursor) -> String {
  let json = serde_json::to_vec(&c).expect("cursor serialize");
  base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
}

pub(crate) fn decode_cursor(token: Option<&str>) -> Result<Cursor, CoreError> {
  match token {
    None => Ok(Cursor { offset: 0, line: Some(0) }),
    Some(t) if t.is_empty() => Ok(Cursor { offset: 0, line: Some(0) }),
    Some(t) => {
      let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(t)
        .map_err(|e| CoreError::BadCursor(e.to_string()))?;
      let c: Cursor = serde_json::from_slice(&bytes)
        .map_err(|e| CoreError::BadCursor(e.to_string()))?;
      Ok(c)
    }
  }
}
