//! Cache key definitions.
//!
//! An [`EpochKey`] identifies one committees response. On disk it becomes
//! `<epoch>.pb`; the same file name keys the warm store.

use std::fmt;

/// Extension of persisted records.
pub const RECORD_EXTENSION: &str = "pb";

/// Epoch identifying one cached committees response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpochKey(u64);

impl EpochKey {
    pub const fn new(epoch: u64) -> Self {
        Self(epoch)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parse a request parameter. Only plain ASCII digits are accepted, so
    /// signs and whitespace that `u64::from_str` would tolerate are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        raw.parse().ok().map(Self)
    }

    /// Keys following this one, at most `count` of them.
    pub fn following(self, count: u64) -> impl Iterator<Item = EpochKey> {
        let end = self.0.saturating_add(count);
        (self.0..end).map(|epoch| EpochKey(epoch + 1))
    }

    /// File name of the persisted record, e.g. `1234.pb`.
    pub fn file_name(self) -> String {
        format!("{}.{RECORD_EXTENSION}", self.0)
    }
}

impl fmt::Display for EpochKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a directory entry name looks like a persisted record.
pub(crate) fn is_record_name(name: &str) -> bool {
    name.strip_suffix(RECORD_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .is_some_and(|stem| !stem.is_empty() && !stem.starts_with('.'))
}
