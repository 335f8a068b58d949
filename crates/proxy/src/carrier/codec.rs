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

//! Reversible, URL-safe encoding of status messages carried in `msg`.

use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use snafu::{ResultExt, Snafu};

/// base64url without padding on the way out, tolerant of padding on the way
/// in.
const MESSAGE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CodecError {
    #[snafu(display("message is not valid base64url"))]
    Base64 { source: base64::DecodeError },

    #[snafu(display("message is not valid UTF-8"))]
    Utf8 { source: std::string::FromUtf8Error },
}

pub fn encode(message: &str) -> String { MESSAGE_ENGINE.encode(message) }

pub fn decode(encoded: &str) -> Result<String, CodecError> {
    let bytes = MESSAGE_ENGINE.decode(encoded).context(Base64Snafu)?;
    String::from_utf8(bytes).context(Utf8Snafu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reverses_encode() {
        let messages = [
            "",
            "Invalid URL: not a url",
            "Downloaded http://example.com/song.mp3?a=1&b=2 to song.mp3.jpg",
            "ünïcödé ✓ <strong>markup</strong>",
            "??>>~~",
        ];
        for message in messages {
            let encoded = encode(message);
            assert!(
                encoded
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
                "{encoded} is not url safe"
            );
            assert_eq!(decode(&encoded).unwrap(), message);
        }
    }

    #[test]
    fn accepts_padded_input() {
        assert_eq!(decode("aGk=").unwrap(), "hi");
        assert_eq!(decode("aGk").unwrap(), "hi");
    }

    #[test]
    fn reports_garbage() {
        assert!(matches!(decode("!!not base64!!"), Err(CodecError::Base64 { .. })));
        assert!(matches!(decode("_w"), Err(CodecError::Utf8 { .. })));
    }
}
