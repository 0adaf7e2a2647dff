/*!

# Peer-to-Peer Messaging

## Introduction

Meridian nodes talk over message-preserving datagram transports, WebSocket
between backbone nodes and WebRTC data channels between browsers. Everything
on the wire is raw binary in network byte order.

## Frame format

Every message starts with a 13-byte frame header:

```text
bytes
0-3     Magic (0x42042042)
4       Message type
5-8     Total length including header (big-endian u32)
9-12    Checksum (first 4 bytes of the Blake2b-256 digest of the payload)
13..    Payload, layout determined by the message type
```

The type byte determines the payload layout; see [`message::MessageType`]
for the full catalogue. A message may be up to 10 MiB.

## Chunking

Transports carry frames of at most 16 KiB. Larger messages are split into
chunks, each prefixed with a one-byte tag:

```text
bytes
0       Tag (increments per message, modulo 255)
1..     Message bytes, the first chunk starting with the frame header
```

Chunks of different messages never interleave on one channel: a receiver
holds at most one partially reassembled message, and a chunk with an
unexpected tag kills the connection. See [`data_channel::DataChannel`].

## Request/response

There are no request ids. A requester registers which message types it is
waiting for ([`data_channel::DataChannel::expect_message`]) and the arrival
of any message of such a type confirms the expectation. Two timers guard
every expectation, one for the whole message and one between chunks.

[`peer_channel::PeerChannel`] is the typed surface the rest of the node
uses: one send method and one `on_*` subscription per message kind.

*/

pub mod data_channel;
pub mod message;
pub mod message_types;
pub mod peer_channel;
pub mod timers;
