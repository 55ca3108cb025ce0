/// Substring matcher prepared once per search and applied to each line's
/// content bytes. Case-insensitive matching folds ASCII only, matching the
/// byte-oriented text model.
pub(crate) struct LineMatcher {
  needle: Vec<u8>,
  case_sensitive: bool,
}

impl LineMatcher {
  pub(crate) fn new(needle: &[u8], case_sensitive: bool) -> Self {
    let needle = if case_sensitive {
      needle.to_vec()
    } else {
      needle.to_ascii_lowercase()
    };
    Self { needle, case_sensitive }
  }

  /// An empty needle matches every line.
  pub(crate) fn matches(&self, hay: &[u8]) -> bool {
    if self.needle.is_empty() {
      return true;
    }
    if self.needle.len() > hay.len() {
      return false;
    }
    if self.case_sensitive {
      hay.windows(self.needle.len()).any(|w| w == self.needle.as_slice())
    } else {
      hay
        .windows(self.needle.len())
        .any(|w| w.eq_ignore_ascii_case(&self.needle))
    }
  }
}
