//! `file://` URI encoding and the client-spelling cache.

use std::sync::Mutex;

use percent_encoding::{percent_decode_str, AsciiSet, CONTROLS};

use scry_core::AbsPath;
use scry_sync::LruCache;

/// Characters percent-encoded inside the path portion of a `file://` URI.
const URI_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'$')
    .add(b'&')
    .add(b'(')
    .add(b')')
    .add(b'+')
    .add(b',')
    .add(b';')
    .add(b'?')
    .add(b'@');

/// Builds a `file://` URI for `path`. Windows drive letters get the
/// `file:///c%3A/...` form; POSIX paths the `file:///...` form.
pub fn path_to_uri(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let mut out = String::from("file://");

    // A drive letter may appear bare ("C:\...") or behind the normalized
    // leading slash ("/c:/...").
    let mut rest = normalized.strip_prefix('/').unwrap_or(&normalized);
    if let Some((drive, tail)) = split_drive(rest) {
        out.push('/');
        out.push_str(&drive.to_ascii_lowercase());
        out.push_str("%3A");
        rest = tail;
    }

    for segment in rest.split('/') {
        if segment.is_empty() {
            continue;
        }
        out.push('/');
        out.push_str(
            &percent_encoding::utf8_percent_encode(segment, URI_ENCODE_SET).to_string(),
        );
    }
    if out == "file://" {
        out.push('/');
    }
    out
}

/// Parses a `file://` URI back into a normalized absolute path.
pub fn uri_to_path(uri: &str) -> Option<AbsPath> {
    let rest = uri
        .strip_prefix("file://")
        .or_else(|| uri.strip_prefix("FILE://"))?;
    let rest = rest.strip_prefix('/').map(|r| (r, true)).unwrap_or((rest, false));
    let (encoded, had_authority_slash) = rest;

    let decoded = percent_decode_str(encoded).decode_utf8().ok()?;

    // Drive-letter form: "c:/..." or "c%3A/..." decoded to "c:/...".
    if split_drive(&decoded).is_some() {
        return Some(AbsPath::new(decoded.as_ref()));
    }

    let mut path = String::new();
    if had_authority_slash || !decoded.starts_with('/') {
        path.push('/');
    }
    path.push_str(&decoded);
    Some(AbsPath::new(&path))
}

/// Splits `"C:..."` into the drive letter and the remainder.
fn split_drive(path: &str) -> Option<(&str, &str)> {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        Some((&path[..1], &path[2..]))
    } else {
        None
    }
}

const MAX_SPELLING_ENTRIES: usize = 5000;

/// Maps normalized paths back to the client's original spelling, so replies
/// echo the client's casing and separator style.
pub struct UriSpellingCache {
    cache: Mutex<LruCache<AbsPath, String>>,
}

impl UriSpellingCache {
    pub fn new() -> UriSpellingCache {
        UriSpellingCache {
            cache: Mutex::new(LruCache::new(MAX_SPELLING_ENTRIES)),
        }
    }

    /// Records the spelling the client used for a path it sent us.
    pub fn record(&self, client_path: &str) {
        let normalized = AbsPath::new(client_path);
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(normalized, client_path.to_string());
    }

    /// The spelling to use in replies for `path`.
    pub fn spelling_for(&self, path: &AbsPath) -> String {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .try_get(path)
            .cloned()
            .unwrap_or_else(|| path.as_str().to_string())
    }

    /// Builds the reply URI for `path`, preferring the recorded client
    /// spelling.
    pub fn uri_for(&self, path: &AbsPath) -> String {
        path_to_uri(&self.spelling_for(path))
    }
}

impl Default for UriSpellingCache {
    fn default() -> Self {
        UriSpellingCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_round_trip() {
        let uri = path_to_uri("/home/user/My Code/foo.cc");
        assert_eq!(uri, "file:///home/user/My%20Code/foo.cc");
        assert_eq!(
            uri_to_path(&uri).unwrap(),
            AbsPath::new("/home/user/My Code/foo.cc")
        );
    }

    #[test]
    fn windows_round_trip() {
        let uri = path_to_uri(r"C:\Users\x y\foo.cc");
        assert_eq!(uri, "file:///c%3A/Users/x%20y/foo.cc");
        // The normalized carrier form keeps the drive behind a leading
        // slash; the spelling cache restores the client's original form.
        let path = uri_to_path(&uri).unwrap();
        assert_eq!(path.as_str(), "/c:/Users/x y/foo.cc");
        assert_eq!(path_to_uri(path.as_str()), uri);
    }

    #[test]
    fn special_characters_are_encoded() {
        let uri = path_to_uri("/a/b#c$d&e(f)g+h,i;j?k@l.cc");
        assert_eq!(uri, "file:///a/b%23c%24d%26e%28f%29g%2Bh%2Ci%3Bj%3Fk%40l.cc");
        assert_eq!(
            uri_to_path(&uri).unwrap(),
            AbsPath::new("/a/b#c$d&e(f)g+h,i;j?k@l.cc")
        );
    }

    #[test]
    fn spelling_cache_restores_client_casing() {
        let cache = UriSpellingCache::new();
        cache.record("/Home/User/Foo.cc");
        assert_eq!(
            cache.spelling_for(&AbsPath::new("/Home/User/Foo.cc")),
            "/Home/User/Foo.cc"
        );
        // Unknown paths fall back to the normalized form.
        assert_eq!(cache.spelling_for(&AbsPath::new("/other.cc")), "/other.cc");
    }
}
