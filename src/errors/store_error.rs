// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::io;

/// The cache store failed to execute an operation, usually because the
/// connection to it is gone.
///
/// The error carries the reason plus a chain of contexts describing when the
/// failure surfaced:
///
/// ```rust
/// # use mirror_cache::errors::StoreError;
/// let err = StoreError::new("connection reset")
///     .context("writing page 3")
///     .context("populating kind=group");
/// ```
#[derive(thiserror::Error, Debug)]
pub struct StoreError {
    /// Why the store operation failed.
    reason: String,

    /// Contexts appended via [`StoreError::context`], oldest first.
    when: Vec<String>,
}

impl StoreError {
    pub fn new(reason: impl ToString) -> Self {
        StoreError {
            reason: reason.to_string(),
            when: vec![],
        }
    }

    /// Append a context describing when the error occurred.
    pub fn context(mut self, context: impl ToString) -> Self {
        self.when.push(context.to_string());
        self
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "cache store error: {}", self.reason)?;

        if self.when.is_empty() {
            return Ok(());
        }

        write!(f, "; when: (")?;
        for (i, when) in self.when.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", when)?;
        }
        write!(f, ")")
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::new(err)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_display_without_context() {
        let err = StoreError::new("timed out");
        assert_eq!(err.to_string(), "cache store error: timed out");
    }

    #[test]
    fn test_display_with_context_chain() {
        let err = StoreError::new("broken pipe")
            .context("deleting search entries")
            .context("kind=project");
        assert_eq!(
            err.to_string(),
            "cache store error: broken pipe; when: (deleting search entries; kind=project)"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err: StoreError = io_err.into();
        assert_eq!(err.to_string(), "cache store error: refused");
    }
}
