//! client side of the sync protocol

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use super::{Request, RequestDecorator, Response};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::refs::HEADS_PREFIX;
use crate::transfer::FetchSource;

/// carries a prepared request to the peer and returns its response;
/// the HTTP wrapper outside the core implements this
pub trait Transport {
    fn send(&self, request: &Request) -> Result<Response>;
}

/// sync-protocol client over an arbitrary transport
pub struct Client<T: Transport> {
    transport: T,
    decorator: Box<dyn RequestDecorator>,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, decorator: Box<dyn RequestDecorator>) -> Self {
        Self { transport, decorator }
    }

    fn send(&self, mut request: Request) -> Result<Response> {
        self.decorator.decorate(&mut request);
        self.transport.send(&request)
    }

    /// GET /info/refs
    pub fn list_refs(&self) -> Result<BTreeMap<String, Digest>> {
        let response = self.send(Request::get("/info/refs"))?;
        if response.status != 200 {
            return Err(Error::transport_msg(format!("remote error: {}", response.status)));
        }

        let raw: BTreeMap<String, String> = serde_json::from_slice(&response.body)
            .map_err(|e| Error::transport_msg(format!("invalid refs listing: {}", e)))?;

        let mut refs = BTreeMap::new();
        for (name, hex) in raw {
            let digest = Digest::from_hex(&hex)
                .map_err(|e| Error::transport(format!("invalid hash for ref {}", name), e))?;
            refs.insert(name, digest);
        }
        Ok(refs)
    }

    /// GET /objects/<hex>
    pub fn fetch_object(&self, digest: &Digest) -> Result<Object> {
        let response = self.send(Request::get(format!("/objects/{}", digest)))?;
        match response.status {
            200 => serde_json::from_slice(&response.body)
                .map_err(|e| Error::transport_msg(format!("invalid object record: {}", e))),
            404 => Err(Error::ObjectNotFound(*digest)),
            status => Err(Error::transport_msg(format!("remote error: {}", status))),
        }
    }

    /// POST /objects/ with a gzip-framed JSON array
    pub fn push_objects(&self, objects: &[Object]) -> Result<()> {
        let json = serde_json::to_vec(objects)
            .map_err(|e| Error::transport_msg(format!("encode objects: {}", e)))?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json)
            .map_err(|e| Error::transport_msg(format!("gzip encode: {}", e)))?;
        let body = encoder
            .finish()
            .map_err(|e| Error::transport_msg(format!("gzip encode: {}", e)))?;

        let mut request = Request::post("/objects/", body);
        request.content_encoding = Some("gzip".to_string());

        let response = self.send(request)?;
        if response.status != 201 {
            return Err(Error::transport_msg(format!(
                "remote error: {} - {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            )));
        }
        Ok(())
    }

    /// GET /refs/heads/<name>
    pub fn get_ref(&self, name: &str) -> Result<Digest> {
        let name = name.trim_start_matches(HEADS_PREFIX);
        let response = self.send(Request::get(format!("/refs/heads/{}", name)))?;
        match response.status {
            200 => {
                let body: BTreeMap<String, String> = serde_json::from_slice(&response.body)
                    .map_err(|e| Error::transport_msg(format!("invalid ref record: {}", e)))?;
                match body.get("hash") {
                    Some(hex) => Digest::from_hex(hex),
                    None => Err(Error::transport_msg("ref record missing hash".to_string())),
                }
            }
            404 => Err(Error::BranchNotFound(name.to_string())),
            status => Err(Error::transport_msg(format!("remote error: {}", status))),
        }
    }

    /// POST /refs/heads/<name>
    pub fn set_ref(&self, name: &str, digest: &Digest) -> Result<()> {
        let name = name.trim_start_matches(HEADS_PREFIX);
        let body = format!("{{\"hash\":\"{}\"}}", digest.to_hex()).into_bytes();

        let response = self.send(Request::post(format!("/refs/heads/{}", name), body))?;
        if response.status != 200 {
            return Err(Error::transport_msg(format!(
                "remote error: {} - {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            )));
        }
        Ok(())
    }
}

impl<T: Transport> FetchSource for Client<T> {
    fn fetch_object(&self, digest: &Digest) -> Result<Object> {
        Client::fetch_object(self, digest)
    }
}
