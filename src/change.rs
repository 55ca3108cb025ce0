use std::{
  fs::File,
  io::{Read, Seek, SeekFrom},
};

use crate::models::FileChange;

/// The trailing bytes of the file as of the last size observation, used only
/// to tell appends apart from overwrites. Never used for line content.
#[derive(Debug)]
pub(crate) struct TailSnapshot {
  bytes: Vec<u8>,
  file_size: u64,
}

impl TailSnapshot {
  pub(crate) fn capture(file: &mut File, file_size: u64, capacity: usize) -> std::io::Result<Self> {
    let len = file_size.min(capacity as u64) as usize;
    let offset = file_size - len as u64;
    let mut bytes = vec![0u8; len];
    file.seek(SeekFrom::Start(offset))?;
    let n = read_up_to(file, &mut bytes)?;
    bytes.truncate(n);
    Ok(Self { bytes, file_size })
  }

  pub(crate) fn file_size(&self) -> u64 {
    self.file_size
  }

  /// Re-reads the byte range this snapshot was taken from and compares.
  /// Pure growth keeps the old tail bytes intact; anything else is an
  /// overwrite.
  pub(crate) fn classify(&self, file: &mut File, new_size: u64) -> std::io::Result<FileChange> {
    if new_size == self.file_size {
      return Ok(FileChange::Unchanged);
    }
    if new_size < self.file_size {
      return Ok(FileChange::Overwritten);
    }
    let offset = self.file_size - self.bytes.len() as u64;
    let mut reread = vec![0u8; self.bytes.len()];
    file.seek(SeekFrom::Start(offset))?;
    let n = read_up_to(file, &mut reread)?;
    if n == self.bytes.len() && reread == self.bytes {
      Ok(FileChange::Appended)
    } else {
      Ok(FileChange::Overwritten)
    }
  }
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
  let mut total = 0;
  while total < buf.len() {
    let n = file.read(&mut buf[total..])?;
    if n == 0 {
      break;
    }
    total += n;
  }
  Ok(total)
}
