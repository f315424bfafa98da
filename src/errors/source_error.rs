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

/// The source-of-truth server could not be reached or rejected a request.
///
/// "Record not found" is never a `SourceError`; lookups return `Option` and
/// absence is a normal answer. This type is reserved for transport and
/// protocol failures, with a context chain in the same style as
/// [`StoreError`](crate::errors::StoreError).
#[derive(thiserror::Error, Debug)]
pub struct SourceError {
    reason: String,
    when: Vec<String>,
}

impl SourceError {
    pub fn new(reason: impl ToString) -> Self {
        SourceError {
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

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "source-of-truth error: {}", self.reason)?;

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

impl From<io::Error> for SourceError {
    fn from(err: io::Error) -> Self {
        SourceError::new(err)
    }
}
