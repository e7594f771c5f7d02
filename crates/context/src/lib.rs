//! Access to the confidential execution network.
//!
//! - [`RpcTransport`] / [`HttpTransport`]: raw JSON-RPC method execution
//! - [`ExecutionContextClient`] / [`RpcContextClient`]: typed engine surface
//!   with envelope decoding and transient-failure retry
//! - [`NodeAdmin`] / [`HttpNodeAdmin`]: identities, invitations, contexts
//! - [`DefaultContextService`]: single-flight default context provisioning
//! - [`InMemoryEngine`]: in-process engine for tests and dry runs

mod admin;
pub mod client;
pub mod engine;
pub mod envelope;
mod error;
pub mod provisioning;
mod transport;

pub use admin::{ContextInfo, ContextInit, ContextMembership, HttpNodeAdmin, Identity, NodeAdmin};
pub use client::{ExecutionContextClient, RpcContextClient};
pub use engine::{EnvelopeStyle, InMemoryEngine};
pub use error::{ContextError, Result};
pub use provisioning::{
    ContextRecordStore, DefaultContextService, EnsuredContext, FileRecordStore,
    MemoryRecordStore, ProvisioningConfig,
};
pub use transport::{classify_rpc_error, CallScope, HttpTransport, RpcTransport, DEFAULT_RPC_TIMEOUT};
