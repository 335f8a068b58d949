// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Status classification shared by every mole error type.
//!
//! An error enum implements [`StackError`] to expose its chain and
//! [`ErrorExt`] to say which [`StatusCode`] it belongs to. The server turns
//! that into an HTTP status and a client-safe message.

use std::{any::Any, error::Error as StdError};

use http::StatusCode as HttpStatusCode;
use serde::Serialize;
use strum::EnumProperty;

/// Coarse classification of an error, carrying the HTTP status it maps to.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    strum_macros::EnumProperty,
    strum_macros::EnumString,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusCode {
    /// The client sent something unusable.
    #[strum(props(http_status = "400"))]
    InvalidArgument,
    /// A remote server could not be reached or refused the request.
    #[strum(props(http_status = "502"))]
    BadGateway,
    #[strum(props(http_status = "500"))]
    Internal,
    #[strum(props(http_status = "500"))]
    Unknown,
}

impl StatusCode {
    pub fn http_status(self) -> HttpStatusCode {
        self.get_str("http_status")
            .and_then(|value| value.parse::<u16>().ok())
            .and_then(|value| HttpStatusCode::from_u16(value).ok())
            .unwrap_or(HttpStatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Whether details must stay out of client-facing messages.
    pub const fn is_internal(self) -> bool { matches!(self, Self::Internal | Self::Unknown) }
}

/// An error that may wrap another error of the same family.
pub trait StackError: StdError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>);

    fn next(&self) -> Option<&dyn StackError>;

    /// The innermost error of this family.
    fn last(&self) -> &dyn StackError
    where
        Self: Sized,
    {
        let mut current: &dyn StackError = self;
        while let Some(next) = current.next() {
            current = next;
        }
        current
    }

    /// Whether the display of this error adds nothing to its source.
    fn transparent(&self) -> bool { false }
}

pub trait ErrorExt: StackError {
    fn status_code(&self) -> StatusCode { StatusCode::Unknown }

    fn as_any(&self) -> &dyn Any;

    /// The deepest foreign error below [`StackError::last`], if any.
    fn root_cause(&self) -> Option<&dyn StdError>
    where
        Self: Sized,
    {
        let mut cause = self.last().source()?;
        while let Some(next) = cause.source() {
            cause = next;
        }
        Some(cause)
    }

    /// Message safe to show to a client. Internal errors are reduced to
    /// their status, everything else is rendered with its root cause.
    fn output_msg(&self) -> String
    where
        Self: Sized,
    {
        let status = self.status_code();
        if status.is_internal() {
            return format!("Internal error: {status}");
        }
        let error = self.last();
        match self.root_cause() {
            Some(root) if error.transparent() => root.to_string(),
            Some(root) => format!("{error}: {root}"),
            None => error.to_string(),
        }
    }

    /// The whole chain, outermost first, for logs.
    fn debug_chain(&self) -> Vec<String>
    where
        Self: Sized,
    {
        let mut buf = Vec::new();
        self.debug_fmt(0, &mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use snafu::Snafu;

    use super::*;

    #[derive(Debug, Snafu)]
    enum Leaf {
        #[snafu(display("upstream went away"))]
        Upstream { source: std::io::Error },
        #[snafu(display("disk on fire"))]
        Disk,
    }

    impl StackError for Leaf {
        fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
            buf.push(format!("{layer}: {self}"));
        }

        fn next(&self) -> Option<&dyn StackError> { None }
    }

    impl ErrorExt for Leaf {
        fn status_code(&self) -> StatusCode {
            match self {
                Self::Upstream { .. } => StatusCode::BadGateway,
                Self::Disk => StatusCode::Internal,
            }
        }

        fn as_any(&self) -> &dyn Any { self as _ }
    }

    #[test]
    fn maps_status_to_http() {
        assert_eq!(StatusCode::BadGateway.http_status(), HttpStatusCode::BAD_GATEWAY);
        assert_eq!(
            StatusCode::InvalidArgument.http_status(),
            HttpStatusCode::BAD_REQUEST
        );
        assert_eq!(
            StatusCode::Unknown.http_status(),
            HttpStatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn output_msg_includes_root_cause() {
        let err = Leaf::Upstream {
            source: std::io::Error::other("connection refused"),
        };
        assert_eq!(err.output_msg(), "upstream went away: connection refused");
        assert_eq!(err.root_cause().unwrap().to_string(), "connection refused");
    }

    #[test]
    fn output_msg_hides_internal_errors() {
        assert_eq!(Leaf::Disk.output_msg(), "Internal error: internal");
        assert!(StatusCode::Unknown.is_internal());
        assert!(!StatusCode::BadGateway.is_internal());
    }

    #[test]
    fn debug_chain_lists_layers() {
        assert_eq!(Leaf::Disk.debug_chain(), vec!["0: disk on fire".to_string()]);
    }
}
