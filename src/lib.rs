/*!
# Meridian

Meridian is a blockchain designed to be spoken natively by browsers: nodes
connect over WebSocket and WebRTC data channels and sync either the full
chain or compact chain proofs.

This crate contains the peer-to-peer messaging core, the binary wire codec
with the chunked framing layer underneath it and the typed per-peer channel
on top, together with the data types those serialize. Consensus validation,
peer discovery and the transports themselves live in their own crates.

*/
pub mod block;
pub mod crypto;
pub mod network_config;
pub mod networking;
pub mod serialization;
pub mod time;
pub mod transaction;
pub mod util;
