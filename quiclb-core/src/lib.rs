//! quiclb-core: routing core for a transparent QUIC load balancer.
//!
//! Given a raw UDP datagram, the core decides which backend server owns the
//! connection using only the connection ID carried in the packet header. The
//! transport protocol itself is never terminated.
//!
//! # Architecture
//!
//! - **Zero-copy parsing**: headers borrow CID slices from the datagram
//! - **Closed codec set**: plaintext, stream-obfuscated and block-encrypted
//!   CIDs dispatched by configuration kind
//! - **Snapshot state**: configuration epochs and the server pool are
//!   immutable snapshots swapped atomically, so per-packet reads never lock
//!
//! # Module Organization
//!
//! - `packet`: long/short header parsing (RFC 9000 Section 17)
//! - `cid`: server identities, codec configuration, CID codecs and minting
//! - `epoch`: configuration rotation store keyed by rotation tag
//! - `pool`: backend endpoints and their health
//! - `dispatch`: per-datagram routing state machine

pub mod cid;
pub mod dispatch;
pub mod epoch;
pub mod error;
pub mod packet;
pub mod pool;

pub use cid::{CidCodec, CidConfig, CidGenerator, CidKey, CodecKind, RotationTag, ServerId};
pub use dispatch::{
    ConsistentHash, DelegateReason, Delegation, DispatchStats, Dispatcher, DispatcherBuilder,
    DropReason, FirstContactPlacement, HealthPolicy, RoundRobin, RoutingDecision, StatsSnapshot,
};
pub use epoch::{DecodedCid, Epoch, EpochSnapshot, EpochState, EpochStore, EpochStoreConfig};
pub use error::{Error, Result};
pub use packet::{parse_header, Header, HeaderForm, LongHeader, PacketType, RoutableHeader, ShortHeader};
pub use pool::{Endpoint, PoolSnapshot, ServerPool};
