//! Engine-boundary request and response types.
//!
//! The gateway engine is transport-agnostic: the host framework translates
//! its native request into a [`GatewayRequest`] before calling the pipeline,
//! and translates the returned [`GatewayResponse`] back. Header names are
//! normalized to lowercase on insertion so lookups are case-insensitive.
//!
//! # Example
//!
//! ```ignore
//! use gatekit::GatewayRequest;
//! use std::net::IpAddr;
//!
//! let request = GatewayRequest::new("GET", "/api/orders")
//!     .with_header("x-user", "alice")
//!     .with_client_ip("10.0.0.7".parse::<IpAddr>().unwrap());
//!
//! assert_eq!(request.principal(), Some("alice"));
//! ```

use std::collections::HashMap;
use std::net::IpAddr;

/// Header carrying the authenticated user marker when no explicit
/// principal has been attached to the request.
const PRINCIPAL_HEADER: &str = "x-user";

/// An inbound request as seen by the gateway engine.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    client_ip: Option<IpAddr>,
    principal: Option<String>,
}

impl GatewayRequest {
    /// Create a new request with the given method and path.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            client_ip: None,
            principal: None,
        }
    }

    /// Add a header. The name is lowercased for case-insensitive lookup.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    /// Set the client IP address.
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Attach an authenticated principal (e.g. set by an auth layer in the
    /// host framework).
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Get the request method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Get the request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Get the client IP address, if known.
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    /// Resolve the principal associated with this request.
    ///
    /// The explicitly attached principal wins; otherwise the `x-user`
    /// header is consulted. Returns `None` for anonymous requests.
    pub fn principal(&self) -> Option<&str> {
        self.principal
            .as_deref()
            .or_else(|| self.header(PRINCIPAL_HEADER))
    }
}

/// A response produced by a policy, the backend, or the on-error chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl GatewayResponse {
    /// Create a new response with the given status code and an empty body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Create a 200 response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200).with_body(body)
    }

    /// Set the response body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header. The name is lowercased for case-insensitive lookup.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into().to_lowercase(), value.into()));
        self
    }

    /// Get the status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Get the response body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Get the first header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over all headers.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}
