//! `rdp`: a reliable, ordered, connection-oriented transport over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────┐  send / recv / close   ┌────────────┐
//!  │   Stream   │◀──────────────────────▶│   Stream   │
//!  └─────┬──────┘                        └─────▲──────┘
//!        │ connect (SYN)                       │ accept provisions
//!        │                               ┌─────┴──────┐
//!        └──────────────────────────────▶│  Listener  │ rendezvous socket
//!                                        └────────────┘
//!  Stream
//!    ├── SendWindow    (selective ACKs, per-segment retransmit timers)
//!    ├── ReorderBuffer (out-of-order delivery within the window)
//!    └── Socket        (tokio UdpSocket + fault Simulator)
//! ```
//!
//! Each module has a single responsibility:
//! - [`seq`]       : 24-bit sequence numbers
//! - [`segment`]   : wire format and message chunking
//! - [`sender`]    : send-side window state machine
//! - [`receiver`]  : receive-side reorder buffer
//! - [`timer`]     : retransmission timeout and retry budgets
//! - [`stream`]    : handshake, transfer and teardown for one connection
//! - [`listener`]  : passive open and SYN deduplication
//! - [`state`]     : finite-state-machine types
//! - [`observer`]  : segment and lifecycle reporting
//! - [`simulator`] : optional lossy network layer for testing
//! - [`socket`]    : async UDP socket abstraction
//! - [`config`]    : endpoint settings
//! - [`message`]   : file-transfer request/response framing
//! - [`transfer`]  : file-transfer server and clients

pub mod config;
pub mod error;
pub mod listener;
pub mod message;
pub mod observer;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod seq;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod stream;
pub mod timer;
pub mod transfer;

pub use config::Config;
pub use error::{RdpError, Result};
pub use listener::Listener;
pub use stream::Stream;
