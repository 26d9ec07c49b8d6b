//! Privileged side of the bridge.
//!
//! The hub owns the revision ledger, tracks connected peers, dispatches RPC
//! calls, and fans state changes out as snapshot broadcasts. One
//! [`HubService`] task drives everything; [`HubHandle`] clones command it
//! from anywhere in the process.

pub mod ledger;
pub mod pending;
pub mod rpc;
pub mod service;
pub mod sync;

pub use ledger::RevisionLedger;
pub use pending::RegistrationQueue;
pub use rpc::{AfterHook, BeforeHook, MethodTable, PreparedCall, RpcCoordinator, RpcHandler};
pub use service::{HubConfig, HubHandle, HubService};
pub use sync::{SyncConfig, SyncCoordinator};
