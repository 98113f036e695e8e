//! HTTP/1.1 parser and serializer.

pub mod message;
pub mod parser;
pub mod serializer;

pub use message::{HttpRequest, HttpResponse, Method, StatusCode, Version};
pub use parser::{RequestParser, ResponseParser};
pub use serializer::{write_request, write_response};
