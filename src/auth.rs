//! Shared-token authentication for inbound and outbound gRPC calls.
//!
//! Every call carries the token in the `auth` metadata field. The
//! [`AuthGate`] interceptor wraps each server so all of its methods are
//! checked the same way before they run.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Metadata key holding the shared token.
pub const AUTH_METADATA_KEY: &str = "auth";

/// Inbound interceptor validating the shared token.
///
/// With no token configured the gate lets every request through.
#[derive(Clone, Default)]
pub struct AuthGate {
    token: Option<Arc<[u8]>>,
}

impl AuthGate {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token
                .filter(|t| !t.is_empty())
                .map(|t| Arc::from(t.as_bytes())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    fn check<T>(&self, request: &Request<T>) -> Result<(), Status> {
        let Some(expected) = self.token.as_deref() else {
            return Ok(());
        };

        let provided = request
            .metadata()
            .get(AUTH_METADATA_KEY)
            .ok_or_else(|| Status::unauthenticated("auth token is not provided"))?;

        if !constant_time_eq(provided.as_bytes(), expected) {
            tracing::warn!("Rejected request with invalid auth token");
            return Err(Status::unauthenticated("invalid auth token"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Interceptor for AuthGate {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        self.check(&request)?;
        Ok(request)
    }
}

/// Attach the shared token to an outbound request.
pub fn attach_token<T>(request: &mut Request<T>, token: &str) -> Result<(), Status> {
    let value: MetadataValue<Ascii> = token
        .parse()
        .map_err(|_| Status::internal("auth token is not valid ASCII metadata"))?;
    request.metadata_mut().insert(AUTH_METADATA_KEY, value);
    Ok(())
}

/// Compare two byte strings in time independent of where they differ.
///
/// Only the length is allowed to short-circuit; the token length is not
/// treated as secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
