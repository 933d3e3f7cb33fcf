//! server side of the sync protocol
//!
//! the server borrows the object store and a small ref-store capability
//! contract; it owns neither. an optional auth check runs before any
//! routing and rejects with 401 without reading the body.

use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::GzDecoder;
use tracing::debug;

use super::{Method, Request, Response};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::refs::HEADS_PREFIX;
use crate::repo::Repository;
use crate::store::Store;

/// the slice of ref behavior the server consumes
pub trait RefStore {
    fn current_commit(&self) -> Result<Digest>;
    fn list_branches(&self) -> Result<Vec<String>>;
    fn get_ref(&self, ref_path: &str) -> Result<Digest>;
    fn set_ref(&self, ref_path: &str, digest: &Digest) -> Result<()>;
}

impl RefStore for Repository {
    fn current_commit(&self) -> Result<Digest> {
        Repository::current_commit(self)
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        Repository::list_branches(self)
    }

    fn get_ref(&self, ref_path: &str) -> Result<Digest> {
        Repository::get_ref(self, ref_path)
    }

    fn set_ref(&self, ref_path: &str, digest: &Digest) -> Result<()> {
        Repository::set_ref(self, ref_path, digest)
    }
}

/// verifies credentials on an incoming request
pub trait AuthCheck {
    fn check(&self, request: &Request) -> bool;
}

/// bearer-token check against a shared secret
pub struct SharedSecret {
    token: String,
}

impl SharedSecret {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl AuthCheck for SharedSecret {
    fn check(&self, request: &Request) -> bool {
        request
            .authorization
            .as_deref()
            .is_some_and(|header| header == format!("Bearer {}", self.token))
    }
}

/// routes sync-protocol requests against a store and ref store
pub struct Server<'a> {
    store: &'a Store,
    refs: &'a dyn RefStore,
    auth: Option<&'a dyn AuthCheck>,
}

impl<'a> Server<'a> {
    pub fn new(store: &'a Store, refs: &'a dyn RefStore, auth: Option<&'a dyn AuthCheck>) -> Self {
        Self { store, refs, auth }
    }

    /// dispatch one request
    pub fn handle(&self, request: &Request) -> Response {
        if let Some(auth) = self.auth {
            if !auth.check(request) {
                return Response::error(401, "Unauthorized");
            }
        }

        debug!(path = %request.path, method = ?request.method, "protocol request");

        if request.path == "/info/refs" {
            return self.handle_info_refs(request);
        }
        if let Some(rest) = request.path.strip_prefix("/objects/") {
            return self.handle_objects(request, rest);
        }
        if let Some(name) = request.path.strip_prefix("/refs/heads/") {
            return self.handle_ref(request, name);
        }

        Response::error(404, "not found")
    }

    /// GET /info/refs: every ref plus HEAD, as `ref-path -> hex`
    fn handle_info_refs(&self, request: &Request) -> Response {
        if request.method != Method::Get {
            return Response::error(405, "method not allowed");
        }

        let mut refs: BTreeMap<String, String> = BTreeMap::new();

        if let Ok(head) = self.refs.current_commit() {
            refs.insert("HEAD".to_string(), head.to_hex());
        }
        if let Ok(branches) = self.refs.list_branches() {
            for branch in branches {
                let ref_path = format!("{}{}", HEADS_PREFIX, branch);
                if let Ok(digest) = self.refs.get_ref(&ref_path) {
                    refs.insert(ref_path, digest.to_hex());
                }
            }
        }

        Response::json(200, &refs)
    }

    /// GET /objects/<hex> and POST /objects/
    fn handle_objects(&self, request: &Request, rest: &str) -> Response {
        match request.method {
            Method::Get => {
                if rest.is_empty() {
                    return Response::error(400, "missing hash");
                }
                let digest = match Digest::from_hex(rest) {
                    Ok(digest) => digest,
                    Err(e) => return Response::error(400, &format!("invalid hash: {}", e)),
                };

                match self.store.get(&digest) {
                    Ok(obj) => Response::json(200, &*obj),
                    Err(Error::ObjectNotFound(_)) => Response::error(404, "object not found"),
                    Err(e) => Response::error(500, &format!("internal error: {}", e)),
                }
            }

            Method::Post => {
                let body = match decode_body(request) {
                    Ok(body) => body,
                    Err(message) => return Response::error(400, &message),
                };

                let objects: Vec<Object> = match serde_json::from_slice(&body) {
                    Ok(objects) => objects,
                    Err(e) => return Response::error(400, &format!("invalid request body: {}", e)),
                };

                for obj in &objects {
                    if let Err(e) = self.store.put(obj.kind, &obj.data) {
                        return Response::error(500, &format!("failed to store object: {}", e));
                    }
                }

                debug!(count = objects.len(), "objects received");
                Response::status(201)
            }
        }
    }

    /// GET and POST /refs/heads/<name>
    fn handle_ref(&self, request: &Request, name: &str) -> Response {
        if name.is_empty() {
            return Response::error(400, "missing branch name");
        }
        let ref_path = format!("{}{}", HEADS_PREFIX, name);

        match request.method {
            Method::Get => match self.refs.get_ref(&ref_path) {
                Ok(digest) => {
                    let body: BTreeMap<&str, String> =
                        BTreeMap::from([("hash", digest.to_hex())]);
                    Response::json(200, &body)
                }
                Err(_) => Response::error(404, "ref not found"),
            },

            Method::Post => {
                let parsed: BTreeMap<String, String> = match serde_json::from_slice(&request.body)
                {
                    Ok(parsed) => parsed,
                    Err(e) => return Response::error(400, &format!("invalid request: {}", e)),
                };
                let digest = match parsed.get("hash").map(|h| Digest::from_hex(h)) {
                    Some(Ok(digest)) => digest,
                    Some(Err(e)) => return Response::error(400, &format!("invalid hash: {}", e)),
                    None => return Response::error(400, "missing hash"),
                };

                match self.refs.set_ref(&ref_path, &digest) {
                    Ok(()) => Response::status(200),
                    Err(e) => Response::error(500, &format!("failed to update ref: {}", e)),
                }
            }
        }
    }
}

/// unwrap optional gzip framing on a request body
fn decode_body(request: &Request) -> std::result::Result<Vec<u8>, String> {
    if request.content_encoding.as_deref() == Some("gzip") {
        let mut out = Vec::new();
        GzDecoder::new(&request.body[..])
            .read_to_end(&mut out)
            .map_err(|e| format!("invalid gzip body: {}", e))?;
        Ok(out)
    } else {
        Ok(request.body.clone())
    }
}
