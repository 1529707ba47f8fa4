//! SigV4 canonical requests.
//!
//! A canonical request is six newline-separated parts: method, path, query,
//! header block (itself newline-terminated), signed header list and payload
//! hash. For MSK the request is always `GET /` with a single `host` header and
//! the authentication parameters in the query.
//!
//! Query parameters are taken decoded and encoded here, so the presigner and
//! the verifier produce byte-identical strings however the values travelled.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Everything except the RFC 3986 unreserved characters is escaped.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Build the canonical request.
///
/// `query` holds decoded pairs; `headers` may contain headers that are not
/// signed, only those named in `signed_headers` are included.
///
/// # Examples
///
/// ```
/// use msk_sasl_sigv4::canonical::build_canonical_request;
///
/// let canonical = build_canonical_request(
///     "GET",
///     "/",
///     &[("Action", "kafka-cluster:Connect")],
///     &[("host", "b-1.example.com")],
///     &["host"],
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
/// );
/// assert!(canonical.starts_with("GET\n/\nAction=kafka-cluster%3AConnect\nhost:b-1.example.com\n\nhost\n"));
/// ```
#[must_use]
pub fn build_canonical_request(
    method: &str,
    uri: &str,
    query: &[(&str, &str)],
    headers: &[(&str, &str)],
    signed_headers: &[&str],
    payload_hash: &str,
) -> String {
    [
        method.to_owned(),
        build_canonical_uri(uri),
        build_canonical_query_string(query),
        format!("{}\n", build_canonical_headers(headers, signed_headers)),
        build_signed_headers_string(signed_headers),
        payload_hash.to_owned(),
    ]
    .join("\n")
}

/// Encode each path segment, keeping the slashes. An empty path becomes `/`.
///
/// Segments are decoded first so an already-escaped path is not escaped twice.
///
/// ```
/// use msk_sasl_sigv4::canonical::build_canonical_uri;
///
/// assert_eq!(build_canonical_uri(""), "/");
/// assert_eq!(build_canonical_uri("/a b/c%20d"), "/a%20b/c%20d");
/// ```
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }
    let segments: Vec<String> = path
        .split('/')
        .map(|segment| uri_encode(&percent_decode_str(segment).decode_utf8_lossy()))
        .collect();
    segments.join("/")
}

/// Encode and sort decoded query pairs into `k=v&k=v` form.
///
/// Pairs are ordered by encoded key, then encoded value.
///
/// ```
/// use msk_sasl_sigv4::canonical::build_canonical_query_string;
///
/// assert_eq!(build_canonical_query_string(&[]), "");
/// assert_eq!(
///     build_canonical_query_string(&[("X-Amz-Expires", "300"), ("Action", "kafka-cluster:Connect")]),
///     "Action=kafka-cluster%3AConnect&X-Amz-Expires=300"
/// );
/// ```
#[must_use]
pub fn build_canonical_query_string(params: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| (uri_encode(key), uri_encode(value)))
        .collect();
    // Sorting the joined "k=v" strings would put "a-b" before "a".
    pairs.sort_unstable();
    pairs
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// The `name:value` lines for the signed headers, sorted, without the
/// trailing newline.
///
/// Names are matched case-insensitively. Values are trimmed with inner
/// whitespace runs collapsed; repeated headers are joined with commas.
#[must_use]
pub fn build_canonical_headers(headers: &[(&str, &str)], signed_headers: &[&str]) -> String {
    let mut values: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        match values.get_mut(&name.to_ascii_lowercase()) {
            Some(existing) => {
                existing.push(',');
                existing.push_str(&value);
            }
            None => {
                values.insert(name.to_ascii_lowercase(), value);
            }
        }
    }

    let signed: Vec<String> = signed_headers
        .iter()
        .map(|name| name.to_ascii_lowercase())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    signed
        .iter()
        .filter_map(|name| values.get(name).map(|value| format!("{name}:{value}")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sorted, `;`-joined lowercase header names.
///
/// ```
/// use msk_sasl_sigv4::canonical::build_signed_headers_string;
///
/// assert_eq!(build_signed_headers_string(&["x-amz-date", "Host"]), "host;x-amz-date");
/// ```
#[must_use]
pub fn build_signed_headers_string(signed_headers: &[&str]) -> String {
    let mut names: Vec<String> = signed_headers
        .iter()
        .map(|name| name.to_ascii_lowercase())
        .collect();
    names.sort_unstable();
    names.dedup();
    names.join(";")
}

/// Percent-encode everything outside the unreserved set, spaces as `%20`.
#[must_use]
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, UNRESERVED).to_string()
}
