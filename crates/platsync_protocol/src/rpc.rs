//! Point-to-point call abstraction.
//!
//! Both synchronous channels (the follower's bulk fetch and the owner's
//! best-effort push) go through [`RpcClient`]. Implement it to plug in an
//! actual network client; [`LoopbackClient`] routes calls straight into an
//! in-process handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Blocking request/response client.
pub trait RpcClient: Send + Sync {
    /// Sends `body` to `url` and returns the response body.
    fn call(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the client is healthy.
    fn is_healthy(&self) -> bool;
}

impl<T: RpcClient + ?Sized> RpcClient for Arc<T> {
    fn call(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        (**self).call(url, body)
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }
}

/// Trait for in-process handlers that can answer loopback calls.
pub trait LoopbackServer {
    /// Handles a call addressed to `path` and returns the response body.
    fn handle_call(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for Arc<S> {
    fn handle_call(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        (**self).handle_call(path, body)
    }
}

/// A client that routes calls directly to an in-process server.
///
/// Useful for tests and single-process deployments.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer + Send + Sync> RpcClient for LoopbackClient<S> {
    fn call(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        self.server.handle_call(path_of(url), &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

/// A client that answers every call with a preset response.
///
/// Every call is recorded, including calls made while unhealthy.
pub struct MockRpcClient {
    healthy: AtomicBool,
    response: Mutex<Result<Vec<u8>, String>>,
    calls: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockRpcClient {
    /// Creates a healthy mock with no response set.
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            response: Mutex::new(Err("no mock response set".into())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the response body returned by every call.
    pub fn set_response(&self, body: Vec<u8>) {
        *lock(&self.response) = Ok(body);
    }

    /// Makes every call fail with `message`.
    pub fn set_failure(&self, message: impl Into<String>) {
        *lock(&self.response) = Err(message.into());
    }

    /// Sets the health flag. Unhealthy clients refuse every call.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Returns the recorded calls as `(url, body)` pairs.
    pub fn calls(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.calls).clone()
    }

    /// Returns the number of recorded calls.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl Default for MockRpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcClient for MockRpcClient {
    fn call(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        lock(&self.calls).push((url.to_string(), body));
        if !self.is_healthy() {
            return Err(format!("connection refused: {url}"));
        }
        lock(&self.response).clone()
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// A poisoned lock only means another test thread panicked; the data is intact.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Joins a peer base address and a call path.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Extracts the path component of a URL (`http://host:port/a/b` -> `/a/b`).
///
/// Inputs without a scheme are returned unchanged.
pub fn path_of(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return url;
    };
    let rest = &url[scheme_end + 3..];
    match rest.find('/') {
        Some(i) => &rest[i..],
        None => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl LoopbackServer for Echo {
        fn handle_call(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
            let mut out = path.as_bytes().to_vec();
            out.extend_from_slice(body);
            Ok(out)
        }
    }

    #[test]
    fn path_extraction() {
        assert_eq!(
            path_of("http://platforms:666/GrpcPlatform/GetAllPlatforms"),
            "/GrpcPlatform/GetAllPlatforms"
        );
        assert_eq!(path_of("https://host"), "/");
        assert_eq!(path_of("/api/c/platforms"), "/api/c/platforms");
    }

    #[test]
    fn url_joining() {
        assert_eq!(join_url("http://a:1/", "/x/y"), "http://a:1/x/y");
        assert_eq!(join_url("http://a:1", "x"), "http://a:1/x");
    }

    #[test]
    fn loopback_routes_by_path() {
        let client = LoopbackClient::new(Echo);
        let reply = client.call("http://peer:80/ping", b"!".to_vec()).unwrap();
        assert_eq!(reply, b"/ping!");
        assert!(client.is_healthy());
    }

    #[test]
    fn mock_records_calls() {
        let client = MockRpcClient::new();
        assert!(client.call("http://peer/a", vec![1]).is_err());

        client.set_response(b"ok".to_vec());
        assert_eq!(client.call("http://peer/b", vec![2]).unwrap(), b"ok");

        client.set_healthy(false);
        assert!(client.call("http://peer/c", vec![3]).is_err());

        assert_eq!(client.call_count(), 3);
        assert_eq!(client.calls()[1], ("http://peer/b".to_string(), vec![2]));
    }
}
