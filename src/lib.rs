//! Protocol core for the Mobile Wallet Adapter (MWA).
//!
//! This crate implements the pieces of MWA that are shared by both
//! endpoints of a session and independent of any concrete transport:
//!
//! - [`rpc`] — strict JSON-RPC 2.0 framing ([`rpc::codec`]) and the
//!   full-duplex engine that correlates outbound calls and dispatches
//!   inbound ones ([`rpc::endpoint`], [`rpc::future`]).
//! - [`mwa`] — the four MWA methods' typed request/result/verdict algebra
//!   and domain error codes, plus the server dispatcher ([`mwa::server`])
//!   and client invoker ([`mwa::client`]) built on top of [`rpc`].
//! - [`association`] — the handoff URI parser that bootstraps a scenario.
//! - [`json_pack`] — base64url and boolean-array wire packing, shared by
//!   both [`mwa`] directions.
//!
//! Bringing up the actual duplex byte stream, constructing and submitting
//! transactions, issuing and persisting auth tokens, and key custody are
//! all out of scope — those are injected collaborators supplied by the
//! embedding wallet or dapp client.

pub mod association;
pub mod json_pack;
pub mod mwa;
pub mod rpc;
pub mod task;

pub use association::AssociationUri;
