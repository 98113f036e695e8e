//! Deterministic HTTP/1.1 serialization.

use crate::http::message::{HttpRequest, HttpResponse};

/// Serializes a request line, headers, and body. If the caller supplied a
/// body without a `Content-Length` header, one is computed and inserted.
pub fn write_request(req: &HttpRequest) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + req.body.len());
    out.extend_from_slice(req.method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(req.url.as_bytes());
    out.push(b' ');
    out.extend_from_slice(req.version.as_str().as_bytes());
    out.extend_from_slice(b"\r\n");

    let needs_length = !req.body.is_empty() && !req.headers.contains("content-length");
    for (key, value) in req.headers.iter() {
        write_header_line(&mut out, key, &value);
    }
    if needs_length {
        write_header_line(&mut out, "Content-Length", &req.body.len().to_string());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&req.body);
    out
}

/// Serializes a status line, headers, and body, computing `Content-Length`
/// when the caller didn't supply one and a body is present.
pub fn write_response(res: &HttpResponse) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + res.body.len());
    out.extend_from_slice(res.version.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(res.status.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(res.reason.as_bytes());
    out.extend_from_slice(b"\r\n");

    let needs_length = !res.headers.contains("content-length");
    for (key, value) in res.headers.iter() {
        write_header_line(&mut out, key, &value);
    }
    if needs_length {
        write_header_line(&mut out, "Content-Length", &res.body.len().to_string());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&res.body);
    out
}

fn write_header_line(out: &mut Vec<u8>, key: &str, value: &str) {
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::message::{Method, StatusCode};

    #[test]
    fn request_round_trip_computes_content_length() {
        let req = HttpRequest::new(Method::Post, "/x").with_body(b"abc".to_vec());
        let bytes = write_request(&req);
        assert_eq!(bytes, b"POST /x HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc");
    }

    #[test]
    fn ok_response_serializes_with_content_length() {
        let res = HttpResponse::new(StatusCode::Ok).with_body(b"hi".to_vec());
        let bytes = write_response(&res);
        assert_eq!(bytes, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi");
    }

    #[test]
    fn canned_404_serializes_with_empty_body() {
        let res = HttpResponse::canned(404);
        let bytes = write_response(&res);
        assert_eq!(bytes, b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
    }
}
