//! URL and path utilities for repository-relative node keys.
//!
//! URLs are kept decoded inside the engine and encoded only at the
//! connector boundary. Node keys are normalized decoded URLs, so records
//! reported with different escaping or slash styles land on the same node.

use std::path::{Path, PathBuf};

use crate::errors::PathError;

/// URL prefixes preserved verbatim by [`normalize_url`].
const KNOWN_PREFIXES: &[&str] = &[
    "http://",
    "https://",
    "svn://",
    "svn+ssh://",
    "file:///",
    "file://",
    "^/",
    "../",
    "//",
    "/",
];

/// Trim leading whitespace, turn backslashes into slashes and collapse
/// repeated or trailing separators, keeping a known scheme prefix intact.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim_start();
    let (prefix, rest) = KNOWN_PREFIXES
        .iter()
        .find(|p| url.starts_with(*p))
        .map(|p| (*p, &url[p.len()..]))
        .unwrap_or(("", url));

    let rest = rest.replace('\\', "/");
    let body = rest
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}{}", prefix, body)
}

/// Byte offset where the path part of a normalized URL starts. Everything
/// before it (scheme, user info, host) is never escaped.
fn path_start(url: &str) -> Option<usize> {
    let authority_end = if url.starts_with("file:///") {
        "file:///".len()
    } else if url.starts_with("file://") {
        url["file://".len()..].find('/')? + "file://".len() + 1
    } else if let Some(idx) = url.find("://") {
        idx + 3
    } else {
        return Some(0);
    };
    url[authority_end..].find('/').map(|i| i + authority_end)
}

/// Percent-encode the path part of `url`, one segment at a time.
pub fn encode_url(url: &str) -> String {
    let url = normalize_url(url);
    let Some(start) = path_start(&url) else {
        return url;
    };
    let (head, path) = url.split_at(start);
    let encoded = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}{}", head, encoded)
}

/// Decode the percent-escapes of the path part of `url`.
pub fn decode_url(url: &str) -> Result<String, PathError> {
    let url = normalize_url(url);
    let Some(start) = path_start(&url) else {
        return Ok(url);
    };
    let (head, path) = url.split_at(start);
    if !path.contains('%') {
        return Ok(url);
    }
    let decoded = urlencoding::decode(path).map_err(|e| PathError::Malformed {
        url: url.clone(),
        detail: e.to_string(),
    })?;
    Ok(format!("{}{}", head, decoded))
}

/// Lookup key for a decoded URL.
pub fn url_key(url: &str) -> String {
    normalize_url(url)
}

/// Last segment of a URL.
pub fn url_name(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Parent of a URL, or `None` once the path part is exhausted.
pub fn parent_url(url: &str) -> Option<String> {
    let url = normalize_url(url);
    let start = path_start(&url)?;
    let idx = url.rfind('/')?;
    if idx < start || (idx == start && start > 0) {
        return None;
    }
    if idx == 0 {
        return None;
    }
    Some(url[..idx].to_string())
}

/// Suffix of `url` below `base` (empty for `base` itself), including the
/// leading slash.
pub fn relative_suffix<'a>(url: &'a str, base: &str) -> Option<&'a str> {
    let rest = url.strip_prefix(base)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Append a `/`-separated suffix to a URL.
pub fn join_url(base: &str, suffix: &str) -> String {
    let suffix = suffix.trim_start_matches('/');
    if suffix.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), suffix)
    }
}

/// Working-copy path of `url`, found by substituting `base_url` with
/// `root_path`. `None` when `url` is not below `base_url`.
pub fn local_path(url: &str, base_url: &str, root_path: &Path) -> Option<PathBuf> {
    let suffix = relative_suffix(url, base_url)?.trim_start_matches('/');
    if suffix.is_empty() {
        Some(root_path.to_path_buf())
    } else {
        Some(root_path.join(suffix))
    }
}

/// Inverse of [`local_path`]: repository URL of a working-copy path.
pub fn url_for_path(path: &Path, root_path: &Path, root_url: &str) -> Option<String> {
    let relative = path.strip_prefix(root_path).ok()?;
    let suffix = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    Some(join_url(root_url, &suffix))
}
