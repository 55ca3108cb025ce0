mod change;
mod cursor;
mod engine;
mod models;
mod reader;
mod search;

pub use crate::engine::{CoreEngine, CoreError, CoreOptions};
pub use crate::models::{
  FileChange, LinePage, LineRecord, LineSpan, SearchQuery, SessionInfo,
};
pub use crate::reader::{FileReader, Line, ReaderError, ReaderOptions};
