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

use percent_encoding::percent_decode_str;
use url::Url;

/// Extension appended to every delivered or stored download.
pub const DISGUISE_EXTENSION: &str = "jpg";

/// Name used when a URL has neither a usable path segment nor a host.
const FALLBACK_NAME: &str = "download";

/// The last non-empty path segment of `url`, percent-decoded and made safe
/// to use as a single file name. Falls back to the host for bare origins
/// such as `http://example.com/`.
pub fn remote_basename(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned());

    let name = segment
        .map(|s| s.replace(['/', '\\', '\0'], "_"))
        .filter(|s| s != "." && s != "..")
        .or_else(|| url.host_str().map(str::to_owned))
        .unwrap_or_else(|| FALLBACK_NAME.to_owned());

    if name.is_empty() { FALLBACK_NAME.to_owned() } else { name }
}

/// `<basename>.jpg`, whatever the remote content actually is.
pub fn disguised_filename(url: &Url) -> String {
    format!("{}.{DISGUISE_EXTENSION}", remote_basename(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url { Url::parse(s).unwrap() }

    #[test]
    fn keeps_every_extension_and_appends_jpg() {
        assert_eq!(disguised_filename(&url("http://h/archive.tar.gz")), "archive.tar.gz.jpg");
        assert_eq!(disguised_filename(&url("http://example.com/song.mp3")), "song.mp3.jpg");
    }

    #[test]
    fn ignores_query_fragment_and_trailing_slash() {
        assert_eq!(remote_basename(&url("http://h/a/b/track.flac?sig=1#t=3")), "track.flac");
        assert_eq!(remote_basename(&url("http://h/albums/live/")), "live");
    }

    #[test]
    fn decodes_percent_escapes_without_allowing_separators() {
        assert_eq!(remote_basename(&url("http://h/My%20Song.mp3")), "My Song.mp3");
        assert_eq!(remote_basename(&url("http://h/a%2Fb.zip")), "a_b.zip");
        assert_eq!(remote_basename(&url("http://h/%2E%2E")), "h");
    }

    #[test]
    fn falls_back_to_host() {
        assert_eq!(remote_basename(&url("http://example.com")), "example.com");
        assert_eq!(disguised_filename(&url("https://example.com/")), "example.com.jpg");
    }
}
