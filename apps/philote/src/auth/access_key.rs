//! Per-connection read/write capabilities.

use std::collections::HashSet;

/// Channels a connection may read from and write to.
///
/// Built once from a verified access token and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessKey {
    /// `sub` claim of the token, when the issuer set one.
    pub subject_id: Option<String>,
    read: HashSet<String>,
    write: HashSet<String>,
}

impl AccessKey {
    pub fn new<R, W>(subject_id: Option<String>, read: R, write: W) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        W: IntoIterator,
        W::Item: Into<String>,
    {
        Self {
            subject_id,
            read: read.into_iter().map(Into::into).collect(),
            write: write.into_iter().map(Into::into).collect(),
        }
    }

    pub fn can_read(&self, channel: &str) -> bool {
        self.read.contains(channel)
    }

    pub fn can_write(&self, channel: &str) -> bool {
        self.write.contains(channel)
    }
}
