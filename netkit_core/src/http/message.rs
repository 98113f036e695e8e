//! `HttpRequest`/`HttpResponse` data model.

use std::fmt;

/// HTTP/1.1 request methods understood by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Connect,
    Trace,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }

    pub fn parse(s: &str) -> Option<Method> {
        Some(match s {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "CONNECT" => Method::Connect,
            "TRACE" => Method::Trace,
            "PATCH" => Method::Patch,
            _ => return None,
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two HTTP versions this dialect understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }

    pub fn parse(s: &str) -> Option<Version> {
        Some(match s {
            "HTTP/1.0" => Version::Http10,
            "HTTP/1.1" => Version::Http11,
            _ => return None,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbolic status codes used by the dispatch and upgrade layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StatusCode {
    SwitchingProtocols = 101,
    Ok = 200,
    BadRequest = 400,
    NotFound = 404,
    InternalServerError = 500,
}

impl StatusCode {
    pub fn code(&self) -> u16 {
        *self as u16
    }

    pub fn reason(&self) -> &'static str {
        match self {
            StatusCode::SwitchingProtocols => "Switching Protocols",
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }

    /// Best-effort reason phrase for a code not named above.
    pub fn reason_for(code: u16) -> &'static str {
        match code {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }
}

/// Case-insensitive header map that preserves insertion order of first
/// occurrence. Duplicate inserts are folded: values are comma-joined,
/// except `Set-Cookie`, which RFC 6265 forbids folding, so its occurrences
/// are kept as a list instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    order: Vec<String>,
    /// First-seen spelling for each normalized key, used only when
    /// serializing back out — lookups always go through `normalize_key`.
    display: std::collections::HashMap<String, String>,
    values: std::collections::HashMap<String, Vec<String>>,
}

fn normalize_key(key: &str) -> String {
    key.to_ascii_lowercase()
}

fn trim_ows(value: &str) -> &str {
    value.trim_matches(|c| c == ' ' || c == '\t')
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, applying the duplicate-folding policy.
    pub fn insert(&mut self, key: &str, value: &str) {
        let normalized = normalize_key(key);
        let value = trim_ows(value).to_string();
        match self.values.entry(normalized.clone()) {
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(vec![value]);
                self.display.insert(normalized.clone(), key.to_string());
                self.order.push(normalized);
            }
            std::collections::hash_map::Entry::Occupied(mut e) => {
                e.get_mut().push(value);
            }
        }
    }

    /// The folded value for `key`: comma-joined for most headers, or just
    /// the first occurrence's raw value for `Set-Cookie` (use
    /// [`Headers::get_all`] to see every `Set-Cookie` line).
    pub fn get(&self, key: &str) -> Option<String> {
        let key = normalize_key(key);
        let values = self.values.get(&key)?;
        if key == "set-cookie" {
            return values.first().cloned();
        }
        Some(values.join(", "))
    }

    /// All raw values stored under `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.values
            .get(&normalize_key(key))
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(&normalize_key(key))
    }

    /// Iterates headers in order of first occurrence, one entry per key
    /// (folded value) except `Set-Cookie`, which yields one entry per
    /// occurrence.
    pub fn iter(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.order.iter().flat_map(move |key| {
            let values = &self.values[key];
            let display = self.display[key].as_str();
            if key == "set-cookie" {
                values
                    .iter()
                    .map(move |v| (display, v.clone()))
                    .collect::<Vec<_>>()
            } else {
                vec![(display, values.join(", "))]
            }
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A parsed or to-be-serialized HTTP/1.1 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub version: Version,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            version: Version::Http11,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

/// A parsed or to-be-serialized HTTP/1.1 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub version: Version,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::Http11,
            status: status.code(),
            reason: status.reason().to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// A response for a status code not covered by [`StatusCode`].
    pub fn with_code(code: u16) -> Self {
        Self {
            version: Version::Http11,
            status: code,
            reason: StatusCode::reason_for(code).to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// A canned response carrying just a status code and an empty body,
    /// used by the dispatch layer's fallback path.
    pub fn canned(code: u16) -> Self {
        Self::with_code(code).with_header("Content-Length", "0")
    }
}
