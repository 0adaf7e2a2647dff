use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, trace};

use crate::networking::message::{Message, MessageType, MESSAGE_SIZE_MAX};
use crate::networking::timers::Timers;
use crate::time::{create_timestamp, millis_since};

/// Largest transport frame: one tag byte plus payload.
pub const CHUNK_SIZE_MAX: usize = 16 * 1024;

/// Time allowed between successive chunks of an expected message.
pub const CHUNK_TIMEOUT: Duration = Duration::from_secs(5);

/// Ceiling for a whole expected message: worst case, a maximum-size message
/// arriving one maximum-size chunk per chunk-timeout.
pub const MESSAGE_TIMEOUT: Duration =
    Duration::from_secs((MESSAGE_SIZE_MAX / CHUNK_SIZE_MAX) as u64 * 5);

/// Chunk tags count modulo 255, so the tag space is 0..=254. The deployed
/// protocol wraps one short of the full byte; keep it that way or break
/// wire compatibility.
pub const TAG_MODULUS: u16 = u8::MAX as u16;

fn next_tag(tag: Option<u8>) -> u8 {
    match tag {
        Some(tag) => ((tag as u16 + 1) % TAG_MODULUS) as u8,
        None => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Open,
    Closing,
    Closed,
}

/// The seam to the actual transport (WebSocket, WebRTC data channel, or a
/// test double). Implementations must preserve message boundaries and
/// ordering; they need not be reliable.
pub trait ChunkTransport: Send + Sync {
    /// Hand one frame to the transport. Non-blocking; returns whether the
    /// transport accepted it.
    fn send_chunk(&self, chunk: &[u8]) -> bool;

    fn ready_state(&self) -> ReadyState;

    fn close(&self);
}

/// Progress report fired for every chunk of a message still being
/// reassembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    pub received: usize,
    pub total: usize,
}

type TimeoutCallback = Box<dyn FnOnce() + Send>;

/// A registered intent to receive one of a set of message types, armed with
/// a whole-message timer and a between-chunks timer. Indexed under every
/// type in `types`; confirming any one of them retires the whole thing.
struct ExpectedMessage {
    id: String,
    types: Vec<MessageType>,
    timeout_callback: Mutex<Option<TimeoutCallback>>,
    chunk_timeout: Duration,
}

impl ExpectedMessage {
    fn new(
        types: &[MessageType],
        timeout_callback: TimeoutCallback,
        chunk_timeout: Duration,
    ) -> Arc<ExpectedMessage> {
        let mut type_bytes: Vec<u8> = types.iter().map(|ty| *ty as u8).collect();
        type_bytes.sort_unstable();
        type_bytes.dedup();
        let id = type_bytes
            .iter()
            .map(u8::to_string)
            .collect::<Vec<String>>()
            .join("-");
        Arc::new(ExpectedMessage {
            id,
            types: types.to_vec(),
            timeout_callback: Mutex::new(Some(timeout_callback)),
            chunk_timeout,
        })
    }

    fn msg_timer_key(&self) -> String {
        format!("msg-{}", self.id)
    }

    fn chunk_timer_key(&self) -> String {
        format!("chunk-{}", self.id)
    }

    /// Invoke the callback if nobody has yet; it runs at most once no matter
    /// how timeout and failed-confirm interleave.
    fn invoke_timeout(&self) {
        let callback = self.timeout_callback.lock().expect("callback lock").take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

struct Reassembly {
    buf: Vec<u8>,
    total: usize,
    msg_type: Option<MessageType>,
}

struct ChannelState {
    ready_state: ReadyState,
    sending_tag: u8,
    receiving_tag: Option<u8>,
    reassembly: Option<Reassembly>,
    expected_by_type: HashMap<MessageType, Arc<ExpectedMessage>>,
    last_chunk_received_at: u64,
}

type MessageListener = Arc<dyn Fn(&[u8]) + Send + Sync>;
type ChunkListener = Arc<dyn Fn(ChunkProgress) + Send + Sync>;
type CloseListener = Arc<dyn Fn() + Send + Sync>;
type ErrorListener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    message: Vec<MessageListener>,
    chunk: Vec<ChunkListener>,
    close: Vec<CloseListener>,
    error: Vec<ErrorListener>,
}

enum Inbound {
    Complete(Vec<u8>),
    Partial(ChunkProgress, Option<Arc<ExpectedMessage>>),
}

/// Chunked, tag-disciplined message framing over a lossy message-preserving
/// transport.
///
/// Outbound messages are split into frames of at most [`CHUNK_SIZE_MAX`]
/// bytes, each prefixed with a one-byte tag that increases per message.
/// Inbound frames are reassembled under a strict no-interleaving rule: a
/// single message is in flight at a time, and any tag gap or size violation
/// closes the channel.
///
/// All state lives behind one mutex; listener dispatch always happens with
/// the mutex released, so handlers may call back into the channel.
pub struct DataChannel {
    transport: Arc<dyn ChunkTransport>,
    state: Mutex<ChannelState>,
    listeners: Mutex<Listeners>,
    timers: Timers,
}

impl DataChannel {
    pub fn new(transport: Arc<dyn ChunkTransport>) -> Arc<DataChannel> {
        Arc::new(DataChannel {
            transport,
            state: Mutex::new(ChannelState {
                ready_state: ReadyState::Open,
                sending_tag: 0,
                receiving_tag: None,
                reassembly: None,
                expected_by_type: HashMap::new(),
                last_chunk_received_at: create_timestamp(),
            }),
            listeners: Mutex::new(Listeners::default()),
            timers: Timers::new(),
        })
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.lock().expect("channel lock").ready_state
    }

    /// Wall-clock timestamp of the last accepted chunk. Liveness input for
    /// the peer scoring layer.
    pub fn last_chunk_received_at(&self) -> u64 {
        self.state
            .lock()
            .expect("channel lock")
            .last_chunk_received_at
    }

    pub fn silent_millis(&self) -> u64 {
        millis_since(self.last_chunk_received_at())
    }

    // ── Listener registration ───────────────────────────────────────────

    pub fn add_message_listener(&self, listener: impl Fn(&[u8]) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .expect("listeners lock")
            .message
            .push(Arc::new(listener));
    }

    pub fn add_chunk_listener(&self, listener: impl Fn(ChunkProgress) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .expect("listeners lock")
            .chunk
            .push(Arc::new(listener));
    }

    pub fn add_close_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.listeners
            .lock()
            .expect("listeners lock")
            .close
            .push(Arc::new(listener));
    }

    pub fn add_error_listener(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .expect("listeners lock")
            .error
            .push(Arc::new(listener));
    }

    // ── Outbound ────────────────────────────────────────────────────────

    /// Chunk a serialized message onto the transport. Returns whether the
    /// transport accepted every frame.
    ///
    /// Oversized messages are a caller bug, not peer input, and fail the
    /// assertion.
    pub fn send(&self, msg: &[u8]) -> bool {
        assert!(
            msg.len() <= MESSAGE_SIZE_MAX,
            "message of {} bytes exceeds maximum message size",
            msg.len()
        );

        let tag = {
            let mut state = self.state.lock().expect("channel lock");
            if state.ready_state != ReadyState::Open {
                return false;
            }
            let tag = state.sending_tag;
            state.sending_tag = ((tag as u16 + 1) % TAG_MODULUS) as u8;
            tag
        };

        let mut accepted = true;
        let mut offset = 0;
        while offset < msg.len() {
            let take = (msg.len() - offset).min(CHUNK_SIZE_MAX - 1);
            let mut chunk = Vec::with_capacity(take + 1);
            chunk.push(tag);
            chunk.extend_from_slice(&msg[offset..offset + take]);
            offset += take;
            accepted &= self.transport.send_chunk(&chunk);
        }
        accepted
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    /// Feed one transport frame into the reassembly state machine. Called by
    /// the transport adapter for every binary message it receives.
    pub fn receive_chunk(self: &Arc<Self>, frame: &[u8]) {
        let inbound = {
            let mut state = self.state.lock().expect("channel lock");
            if state.ready_state != ReadyState::Open {
                trace!("dropping {} byte chunk on non-open channel", frame.len());
                return;
            }
            if frame.is_empty() {
                trace!("dropping empty chunk");
                return;
            }
            if frame.len() > CHUNK_SIZE_MAX {
                drop(state);
                self.protocol_violation(&format!(
                    "received chunk of {} bytes, larger than maximum chunk size",
                    frame.len()
                ));
                return;
            }

            let tag = frame[0];
            let chunk = &frame[1..];

            if state.reassembly.is_none() {
                let expected_tag = next_tag(state.receiving_tag);
                if tag != expected_tag {
                    drop(state);
                    self.protocol_violation(&format!(
                        "received message with wrong message tag {} (expected {})",
                        tag, expected_tag
                    ));
                    return;
                }
                let total = match Message::peek_length(chunk) {
                    Ok(length) => length as usize,
                    Err(err) => {
                        drop(state);
                        self.protocol_violation(&format!(
                            "failed to read message size from first chunk: {}",
                            err
                        ));
                        return;
                    }
                };
                if total > MESSAGE_SIZE_MAX {
                    drop(state);
                    self.protocol_violation(&format!(
                        "received message with excessive message size {}",
                        total
                    ));
                    return;
                }
                state.receiving_tag = Some(tag);
                state.reassembly = Some(Reassembly {
                    buf: Vec::with_capacity(total),
                    total,
                    msg_type: Message::peek_type(chunk).ok(),
                });
            } else if state.receiving_tag != Some(tag) {
                let expected = state.receiving_tag;
                drop(state);
                self.protocol_violation(&format!(
                    "received message with wrong message tag {} (assembling {:?})",
                    tag, expected
                ));
                return;
            }

            let remaining = {
                let reassembly = state.reassembly.as_ref().expect("reassembly in progress");
                reassembly.total - reassembly.buf.len()
            };
            if chunk.len() > remaining {
                drop(state);
                self.protocol_violation(&format!(
                    "received chunk of {} bytes, larger than remaining message size {}",
                    chunk.len(),
                    remaining
                ));
                return;
            }
            let (received, total, msg_type) = {
                let reassembly = state.reassembly.as_mut().expect("reassembly in progress");
                reassembly.buf.extend_from_slice(chunk);
                (reassembly.buf.len(), reassembly.total, reassembly.msg_type)
            };
            state.last_chunk_received_at = create_timestamp();

            if received == total {
                let complete = state.reassembly.take().expect("reassembly in progress");
                Inbound::Complete(complete.buf)
            } else {
                let expected = msg_type
                    .and_then(|ty| state.expected_by_type.get(&ty))
                    .map(Arc::clone);
                Inbound::Partial(ChunkProgress { received, total }, expected)
            }
        };

        match inbound {
            Inbound::Complete(bytes) => {
                trace!("message complete ({} bytes)", bytes.len());
                let message_listeners = self.listeners.lock().expect("listeners lock").message.clone();
                for listener in message_listeners {
                    listener(&bytes);
                }
            }
            Inbound::Partial(progress, expected) => {
                if let Some(expected) = expected {
                    // The whole-message timer keeps running; only the
                    // between-chunks timer restarts.
                    let weak = Arc::downgrade(self);
                    let expected_clone = Arc::clone(&expected);
                    self.timers.set_timeout(
                        &expected.chunk_timer_key(),
                        expected.chunk_timeout,
                        move || {
                            if let Some(channel) = weak.upgrade() {
                                channel.on_expectation_timeout(&expected_clone);
                            }
                        },
                    );
                }
                let chunk_listeners = self.listeners.lock().expect("listeners lock").chunk.clone();
                for listener in chunk_listeners {
                    listener(progress);
                }
            }
        }
    }

    // ── Expectations ────────────────────────────────────────────────────

    /// Register interest in one of `types` with the default timeouts.
    pub fn expect_message<F>(self: &Arc<Self>, types: &[MessageType], on_timeout: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.expect_message_with_timeouts(types, on_timeout, MESSAGE_TIMEOUT, CHUNK_TIMEOUT);
    }

    /// Register interest in one of `types`. `on_timeout` runs if neither the
    /// whole message arrives within `msg_timeout` nor the chunks of an
    /// expected message keep coming within `chunk_timeout` of each other.
    /// An existing expectation sharing a type is displaced.
    pub fn expect_message_with_timeouts<F>(
        self: &Arc<Self>,
        types: &[MessageType],
        on_timeout: F,
        msg_timeout: Duration,
        chunk_timeout: Duration,
    ) where
        F: FnOnce() + Send + 'static,
    {
        if types.is_empty() {
            return;
        }
        let expected = ExpectedMessage::new(types, Box::new(on_timeout), chunk_timeout);

        let displaced = {
            let mut state = self.state.lock().expect("channel lock");
            if state.ready_state != ReadyState::Open {
                return;
            }
            let mut displaced: Vec<Arc<ExpectedMessage>> = vec![];
            for ty in &expected.types {
                if let Some(old) = state.expected_by_type.insert(*ty, Arc::clone(&expected)) {
                    displaced.push(old);
                }
            }
            // Timers of a fully displaced expectation would fire a stale
            // callback; cancel them. A partially displaced one can still be
            // confirmed under its remaining types.
            displaced.retain(|old| {
                !state
                    .expected_by_type
                    .values()
                    .any(|current| Arc::ptr_eq(current, old))
            });
            displaced
        };
        for old in displaced {
            self.timers.clear_timeout(&old.msg_timer_key());
            self.timers.clear_timeout(&old.chunk_timer_key());
        }

        let weak = Arc::downgrade(self);
        let expected_clone = Arc::clone(&expected);
        self.timers
            .set_timeout(&expected.msg_timer_key(), msg_timeout, move || {
                if let Some(channel) = weak.upgrade() {
                    channel.on_expectation_timeout(&expected_clone);
                }
            });
        let weak = Arc::downgrade(self);
        let expected_clone = Arc::clone(&expected);
        self.timers
            .set_timeout(&expected.chunk_timer_key(), chunk_timeout, move || {
                if let Some(channel) = weak.upgrade() {
                    channel.on_expectation_timeout(&expected_clone);
                }
            });
    }

    pub fn is_expecting_message(&self, ty: MessageType) -> bool {
        self.state
            .lock()
            .expect("channel lock")
            .expected_by_type
            .contains_key(&ty)
    }

    /// Retire the expectation registered under `ty`, cancelling both of its
    /// timers. With `success == false` the expectation's timeout callback
    /// runs as if the timer had fired. No-op if nothing is expected under
    /// `ty`.
    pub fn confirm_expected_message(&self, ty: MessageType, success: bool) {
        let expected = {
            let mut state = self.state.lock().expect("channel lock");
            let expected = match state.expected_by_type.get(&ty) {
                Some(expected) => Arc::clone(expected),
                None => return,
            };
            state
                .expected_by_type
                .retain(|_, current| !Arc::ptr_eq(current, &expected));
            expected
        };
        self.timers.clear_timeout(&expected.msg_timer_key());
        self.timers.clear_timeout(&expected.chunk_timer_key());
        if !success {
            expected.invoke_timeout();
        }
    }

    fn on_expectation_timeout(&self, expected: &Arc<ExpectedMessage>) {
        let still_expected = {
            let mut state = self.state.lock().expect("channel lock");
            let registered = state
                .expected_by_type
                .values()
                .any(|current| Arc::ptr_eq(current, expected));
            if registered {
                state
                    .expected_by_type
                    .retain(|_, current| !Arc::ptr_eq(current, expected));
                // Unblock the channel for fresh messages.
                state.reassembly = None;
            }
            registered
        };
        if !still_expected {
            return;
        }
        self.timers.clear_timeout(&expected.msg_timer_key());
        self.timers.clear_timeout(&expected.chunk_timer_key());
        error!(
            "timed out waiting for message of type(s) {:?}",
            expected.types
        );
        expected.invoke_timeout();
    }

    // ── Errors and shutdown ─────────────────────────────────────────────

    fn protocol_violation(self: &Arc<Self>, why: &str) {
        error!("closing channel: {}", why);
        let error_listeners = self.listeners.lock().expect("listeners lock").error.clone();
        for listener in error_listeners {
            listener(why);
        }
        self.close();
    }

    /// Close the channel. Idempotent; the close event fires exactly once.
    pub fn close(&self) {
        {
            let mut state = self.state.lock().expect("channel lock");
            if state.ready_state != ReadyState::Open {
                return;
            }
            state.ready_state = ReadyState::Closing;
        }
        self.transport.close();
        self.handle_close();
    }

    /// Transport-initiated teardown. Also the tail of [`close`]. Clears all
    /// timers, fires the close event once, then detaches every listener.
    pub fn handle_close(&self) {
        let fire = {
            let mut state = self.state.lock().expect("channel lock");
            if state.ready_state == ReadyState::Closed {
                false
            } else {
                state.ready_state = ReadyState::Closed;
                state.reassembly = None;
                state.expected_by_type.clear();
                true
            }
        };
        if !fire {
            return;
        }
        self.timers.clear_all();
        let listeners = std::mem::take(&mut *self.listeners.lock().expect("listeners lock"));
        for listener in &listeners.close {
            listener();
        }
    }
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Captures outbound chunks; close just flips a flag.
    pub struct MockTransport {
        pub sent: Mutex<Vec<Vec<u8>>>,
        pub closed: AtomicBool,
    }

    impl MockTransport {
        pub fn new() -> Arc<MockTransport> {
            Arc::new(MockTransport {
                sent: Mutex::new(vec![]),
                closed: AtomicBool::new(false),
            })
        }

        pub fn sent_chunks(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ChunkTransport for MockTransport {
        fn send_chunk(&self, chunk: &[u8]) -> bool {
            self.sent.lock().unwrap().push(chunk.to_vec());
            true
        }

        fn ready_state(&self) -> ReadyState {
            if self.closed.load(Ordering::SeqCst) {
                ReadyState::Closed
            } else {
                ReadyState::Open
            }
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}
