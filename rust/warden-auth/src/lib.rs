#![warn(missing_docs)]

//! Wallet sign-in and ledger-backed tool authorization.
//!
//! An owner signs a sign-in message naming the tools they want. The
//! [`ClaimIssuer`] checks the signature, resolves the tools against the
//! [`Catalog`], commits to the ordered tool names on the ledger and hands
//! back a [`BearerClaim`]. On every invocation the [`AuthorizationGate`]
//! takes the claim the client presents, recomputes the commitment from it
//! and lets the request through only if the ledger holds exactly that
//! commitment for the owner, live and unrevoked. The [`SessionRegistry`]
//! exposes status, verification and revocation to relying parties.

mod error;
pub use error::*;

mod catalog;
pub use catalog::*;

mod message;
pub use message::*;

mod signature;
pub use signature::*;

mod claim;
pub use claim::*;

mod settings;
pub use settings::*;

mod verifier;
pub use verifier::*;

mod issuer;
pub use issuer::*;

mod gate;
pub use gate::*;

mod registry;
pub use registry::*;
