//! Request head parsing and representation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::parser::error::Error;
use crate::parser::method::RequestMethod;

/// HTTP/1.x protocol versions accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl FromStr for HttpVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP/1.0" => Ok(HttpVersion::Http10),
            "HTTP/1.1" => Ok(HttpVersion::Http11),
            _ => Err(Error::InvalidVersion(s.to_string())),
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpVersion::Http10 => write!(f, "HTTP/1.0"),
            HttpVersion::Http11 => write!(f, "HTTP/1.1"),
        }
    }
}

/// A parsed request head: request line plus headers. The body is read separately.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method (GET, POST, etc.)
    pub method: RequestMethod,
    /// The raw request target, including any query string
    pub target: String,
    /// The path portion of the target, undecoded
    pub path: String,
    /// The HTTP version
    pub version: HttpVersion,
    /// The HTTP headers
    pub headers: HashMap<String, String>,
    /// Decoded query parameters
    pub query: Map<String, Value>,
}

impl HttpRequest {
    /// Build a request from its parsed parts, splitting the query string off the target.
    pub fn new(method: RequestMethod, target: String, version: HttpVersion, headers: HashMap<String, String>) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), parse_query(query)),
            None => (target.clone(), Map::new()),
        };

        Self {
            method,
            target,
            path,
            version,
            headers,
            query,
        }
    }

    /// Get a header value, ignoring the case of the name.
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers.iter().find_map(|(k, v)| {
            if k.eq_ignore_ascii_case(name) {
                Some(v)
            } else {
                None
            }
        })
    }

    /// Check if a header exists.
    pub fn has_header(&self, name: &str) -> bool {
        self.get_header(name).is_some()
    }

    /// The declared `Content-Length`, if any.
    pub fn content_length(&self) -> Result<Option<usize>, Error> {
        match self.get_header("Content-Length") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| Error::InvalidHeaderValue("Content-Length".to_string())),
            None => Ok(None),
        }
    }

    /// Whether the body is sent with chunked transfer encoding.
    pub fn is_chunked(&self) -> bool {
        self.get_header("Transfer-Encoding")
            .map(|value| {
                value
                    .rsplit(',')
                    .next()
                    .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
            })
            .unwrap_or(false)
    }
}

/// Decode a query string into a parameter map.
///
/// Keys and values are percent-decoded and `+` reads as a space. A key given
/// more than once collects its values into an array.
pub fn parse_query(query: &str) -> Map<String, Value> {
    let mut params = Map::new();

    for pair in query.split('&').filter(|s| !s.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = Value::String(decode_component(value));

        match params.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                params.insert(key, value);
            }
        }
    }

    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        // Leave malformed escapes as sent
        Err(_) => spaced,
    }
}

/// Parse a request head (request line and headers) from a byte slice.
///
/// Parsing stops at the first empty line; anything after it is ignored.
pub fn parse_request(input: &[u8]) -> Result<HttpRequest, Error> {
    let input_str = match std::str::from_utf8(input) {
        Ok(s) => s,
        Err(_) => return Err(Error::MalformedRequestLine("Invalid UTF-8".to_string())),
    };

    let mut lines = input_str.lines();

    let request_line = match lines.next() {
        Some(line) if !line.trim().is_empty() => line,
        _ => return Err(Error::EmptyRequest),
    };

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::MalformedRequestLine(request_line.to_string()));
    }

    let method = RequestMethod::from_str(parts[0])?;

    let target = parts[1].to_string();
    if !target.starts_with('/') {
        return Err(Error::InvalidPath);
    }

    let version = HttpVersion::from_str(parts[2])?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        let (name, value) = line.split_once(':').ok_or(Error::InvalidHeaderFormat)?;
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }

    if version == HttpVersion::Http11 && !headers.keys().any(|k| k.eq_ignore_ascii_case("Host")) {
        return Err(Error::MissingHeader("Host".to_string()));
    }

    Ok(HttpRequest::new(method, target, version, headers))
}
