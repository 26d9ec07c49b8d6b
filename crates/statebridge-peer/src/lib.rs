//! Untrusted side of the bridge.
//!
//! A peer process never broadcasts and never owns revisions: it mirrors
//! entities the hub publishes, forwards local writes as requests, and calls
//! into registered method tables. The push surface is subscribe-only here;
//! the crate split is what keeps the directions from blurring.

pub mod mirror;
pub mod router;
pub mod rpc;

pub use mirror::{EntityMirror, MirrorOptions, MirrorPhase, Validator};
pub use router::PeerRouter;
pub use rpc::RpcClient;
