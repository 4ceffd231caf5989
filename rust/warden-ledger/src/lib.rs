#![warn(missing_docs)]

//! Ledger-side half of the warden authorization protocol.
//!
//! A session binds a wallet [`Address`] to a [`Commitment`]: the SHA-256 of
//! the exact, ordered list of tool names the owner authorized. The commitment
//! lives in a session contract exposing four functions:
//!
//! ```text
//! registerSession(address owner, bytes32 commitment, uint256 ttl)
//! verifySession(address owner, bytes32 commitment) returns (bool)
//! revokeSession(address owner)
//! getSession(address owner) returns (bytes32, uint256, bool)
//! ```
//!
//! The [`LedgerGateway`] is the only component that talks to the contract. It
//! encodes calls with [`SessionCall`], sends them through a [`ChainClient`]
//! and bounds every round-trip with the configured timeout. Two clients are
//! provided:
//!
//! - [`MemoryChain`] emulates the contract in process
//! - [`JsonRpcChain`] speaks Ethereum JSON-RPC to a node
//!
//! ```rust
//! # async fn example() -> Result<(), warden_ledger::LedgerError> {
//! use std::{sync::Arc, time::Duration};
//! use warden_ledger::{Address, LedgerGateway, LedgerSettings, MemoryChain, commit};
//!
//! let chain = MemoryChain::default();
//! let gateway = LedgerGateway::new(
//!     Arc::new(chain),
//!     LedgerSettings::default().with_init_code("0x6080"),
//! );
//! gateway.ensure_provisioned().await?;
//!
//! let owner: Address = "0x8626f6940e2eb28930efb4cef49b2d1f2c9c1199".parse().unwrap();
//! let commitment = commit(&["search_web"]);
//! gateway.register(owner, commitment, Duration::from_secs(60)).await?;
//!
//! assert!(gateway.verify(owner, commitment).await);
//! assert!(!gateway.verify(owner, commit(&["search_web", "query_graph"])).await);
//! # Ok(())
//! # }
//! ```

mod hash;
pub use hash::*;

mod address;
pub use address::*;

mod commitment;
pub use commitment::*;

mod session;
pub use session::*;

mod abi;
pub use abi::*;

mod error;
pub use error::*;

mod chain;
pub use chain::*;

mod settings;
pub use settings::*;

mod gateway;
pub use gateway::*;

mod ledger;
pub use ledger::*;
