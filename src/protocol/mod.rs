//! sync protocol: object and ref wire endpoints
//!
//! the protocol is expressed over a request/response abstraction; an
//! HTTP wrapper outside the core adapts it to a real listener or
//! client. credentials are stamped onto outgoing requests by an opaque
//! decorator, and checked server-side before routing.

pub mod client;
pub mod server;

pub use client::{Client, Transport};
pub use server::{AuthCheck, RefStore, Server, SharedSecret};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// a prepared request, ready for a transport to carry
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    /// credentials header, stamped by a request decorator
    pub authorization: Option<String>,
    /// transport-level body framing ("gzip")
    pub content_encoding: Option<String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            authorization: None,
            content_encoding: None,
            body: vec![],
        }
    }

    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            authorization: None,
            content_encoding: None,
            body,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    /// JSON-encoded body with the given status
    pub fn json<T: serde::Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body,
            },
            Err(e) => Self::error(500, &format!("encode failure: {}", e)),
        }
    }

    /// plain-text error body
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: message.as_bytes().to_vec(),
        }
    }

    /// empty body, status only
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: vec![],
        }
    }
}

/// stamps credentials onto an outgoing request
pub trait RequestDecorator {
    fn decorate(&self, request: &mut Request);
}

/// no credentials
pub struct NoAuth;

impl RequestDecorator for NoAuth {
    fn decorate(&self, _request: &mut Request) {}
}

/// basic credentials
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl RequestDecorator for BasicAuth {
    fn decorate(&self, request: &mut Request) {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        request.authorization = Some(format!("Basic {}", encoded));
    }
}

/// bearer token
pub struct TokenAuth {
    pub token: String,
}

impl RequestDecorator for TokenAuth {
    fn decorate(&self, request: &mut Request) {
        request.authorization = Some(format!("Bearer {}", self.token));
    }
}
