//! Bulk-fetch server.

use crate::error::{ServerError, ServerResult};
use crate::repository::PlatformRepository;
use platsync_protocol::{
    GetAllRequest, LoopbackServer, PlatformResponse, PlatformWire, GET_ALL_PLATFORMS,
};
use tracing::debug;

/// Answers `GetAllPlatforms` with the current contents of the store.
///
/// Read-only: the server never validates or mutates anything.
///
/// # Example
///
/// ```
/// use platsync_protocol::GetAllRequest;
/// use platsync_server::{MemoryPlatformRepository, SyncServer};
///
/// let server = SyncServer::new(MemoryPlatformRepository::new());
/// let response = server.get_all_platforms(GetAllRequest::default()).unwrap();
/// assert!(response.platforms.is_empty());
/// ```
pub struct SyncServer<R> {
    repository: R,
}

impl<R: PlatformRepository> SyncServer<R> {
    /// Creates a server over a store.
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Returns the store.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Returns every platform mapped to the wire shape.
    pub fn get_all_platforms(&self, _request: GetAllRequest) -> ServerResult<PlatformResponse> {
        let records = self.repository.all()?;
        debug!(count = records.len(), "Returning all platforms");
        Ok(PlatformResponse::new(
            records.iter().map(PlatformWire::from).collect(),
        ))
    }

    /// Decodes a raw call, dispatches it and encodes the response.
    pub fn dispatch(&self, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        match path {
            GET_ALL_PLATFORMS => {
                // An empty body is an empty request.
                let request = if body.is_empty() {
                    GetAllRequest::default()
                } else {
                    GetAllRequest::decode(body)?
                };
                Ok(self.get_all_platforms(request)?.encode()?)
            }
            other => Err(ServerError::InvalidRequest(format!(
                "no handler for path {other}"
            ))),
        }
    }
}

impl<R: PlatformRepository> LoopbackServer for SyncServer<R> {
    fn handle_call(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.dispatch(path, body).map_err(|e| e.to_string())
    }
}
