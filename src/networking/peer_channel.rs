use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use crate::block::{Block, BlockHeader};
use crate::networking::data_channel::DataChannel;
use crate::networking::message::{Message, MessageType};
use crate::networking::message_types::addr::{AddrMessage, GetAddrMessage};
use crate::networking::message_types::inventory::{GetBlocksMessage, InvVector};
use crate::networking::message_types::proofs::{
    AccountsProofMessage, AccountsTreeChunkMessage, BlockProofMessage, ChainProofMessage,
    GetAccountsProofMessage, GetAccountsTreeChunkMessage, GetBlockProofMessage,
    GetTransactionReceiptsMessage, GetTransactionsProofMessage, TransactionReceiptsMessage,
    TransactionsProofMessage,
};
use crate::networking::message_types::reject::{RejectCode, RejectMessage};
use crate::networking::message_types::signal::SignalMessage;
use crate::networking::message_types::subscribe::Subscription;
use crate::networking::message_types::version::{VerAckMessage, VersionMessage};
use crate::transaction::Transaction;

/// Why a channel was closed. Surfaced to the address book, which scores the
/// peer accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseType {
    /// Orderly shutdown, no blame assigned.
    Regular,
    /// The peer sent bytes we could not type or a REJECT we could not parse.
    FailedToParseMessageType,
    /// The peer broke framing rules (bad tag, oversized chunk or message).
    ProtocolViolation,
}

/// Timing and size of one received message, for bandwidth accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageStats {
    pub elapsed_millis: u64,
    pub byte_length: usize,
}

type TypedListener = Arc<dyn Fn(&Message) + Send + Sync>;
type MessageLogListener = Arc<dyn Fn(&Message, &MessageStats) + Send + Sync>;
type CloseListener = Arc<dyn Fn(CloseType) + Send + Sync>;

#[derive(Default)]
struct PeerListeners {
    by_type: HashMap<MessageType, Vec<TypedListener>>,
    message_log: Vec<MessageLogListener>,
    close: Vec<CloseListener>,
}

/// Typed facade over a [`DataChannel`]: one send method and one subscription
/// method per message kind, the expect/confirm contract, and the malformed
/// message policy.
///
/// The policy in one line: a message we can type but not parse earns the
/// peer a REJECT and nothing more; bytes we cannot type, or a REJECT we
/// cannot parse, close the channel. A malformed REJECT must never be
/// answered with another REJECT, or two such implementations would ping-pong
/// rejects forever.
pub struct PeerChannel {
    channel: Arc<DataChannel>,
    listeners: Mutex<PeerListeners>,
    close_emitted: AtomicBool,
    protocol_error_seen: AtomicBool,
}

impl PeerChannel {
    pub fn new(channel: Arc<DataChannel>) -> Arc<PeerChannel> {
        let peer_channel = Arc::new(PeerChannel {
            channel,
            listeners: Mutex::new(PeerListeners::default()),
            close_emitted: AtomicBool::new(false),
            protocol_error_seen: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&peer_channel);
        peer_channel.channel.add_message_listener(move |bytes| {
            if let Some(peer_channel) = weak.upgrade() {
                peer_channel.on_message(bytes);
            }
        });
        let weak = Arc::downgrade(&peer_channel);
        peer_channel.channel.add_error_listener(move |_| {
            if let Some(peer_channel) = weak.upgrade() {
                peer_channel
                    .protocol_error_seen
                    .store(true, Ordering::SeqCst);
            }
        });
        let weak = Arc::downgrade(&peer_channel);
        peer_channel.channel.add_close_listener(move || {
            if let Some(peer_channel) = weak.upgrade() {
                let close_type = if peer_channel.protocol_error_seen.load(Ordering::SeqCst) {
                    CloseType::ProtocolViolation
                } else {
                    CloseType::Regular
                };
                peer_channel.emit_close(close_type);
            }
        });

        peer_channel
    }

    pub fn data_channel(&self) -> &Arc<DataChannel> {
        &self.channel
    }

    // ── Receive path ────────────────────────────────────────────────────

    fn on_message(&self, bytes: &[u8]) {
        let started = Instant::now();

        let message_type = match Message::peek_type(bytes) {
            Ok(message_type) => message_type,
            Err(err) => {
                warn!("failed to parse message type, closing channel: {}", err);
                self.close(CloseType::FailedToParseMessageType);
                return;
            }
        };

        let message = match Message::parse(bytes) {
            Ok(message) => message,
            Err(err) => {
                self.channel.confirm_expected_message(message_type, false);
                if message_type == MessageType::Reject {
                    // Answering a broken REJECT with a REJECT would loop.
                    warn!("failed to parse REJECT message, closing channel: {}", err);
                    self.close(CloseType::FailedToParseMessageType);
                } else {
                    warn!("malformed {:?} message dropped: {}", message_type, err);
                    self.reject(RejectMessage::new(
                        message_type as u8,
                        RejectCode::Malformed,
                        &err.to_string(),
                    ));
                }
                return;
            }
        };

        self.channel.confirm_expected_message(message_type, true);

        let typed_listeners = {
            let listeners = self.listeners.lock().expect("listeners lock");
            listeners
                .by_type
                .get(&message_type)
                .cloned()
                .unwrap_or_default()
        };
        for listener in typed_listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&message))).is_err() {
                error!("handler for {:?} message panicked", message_type);
            }
        }

        let stats = MessageStats {
            elapsed_millis: started.elapsed().as_millis() as u64,
            byte_length: bytes.len(),
        };
        let log_listeners = self
            .listeners
            .lock()
            .expect("listeners lock")
            .message_log
            .clone();
        for listener in log_listeners {
            listener(&message, &stats);
        }
        trace!(
            "handled {:?} message ({} bytes in {} ms)",
            message_type,
            stats.byte_length,
            stats.elapsed_millis
        );
    }

    // ── Expectations ────────────────────────────────────────────────────

    pub fn expect_message<F>(&self, types: &[MessageType], on_timeout: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.channel.expect_message(types, on_timeout);
    }

    pub fn expect_message_with_timeouts<F>(
        &self,
        types: &[MessageType],
        on_timeout: F,
        msg_timeout: Duration,
        chunk_timeout: Duration,
    ) where
        F: FnOnce() + Send + 'static,
    {
        self.channel
            .expect_message_with_timeouts(types, on_timeout, msg_timeout, chunk_timeout);
    }

    pub fn confirm_expected_message(&self, ty: MessageType, success: bool) {
        self.channel.confirm_expected_message(ty, success);
    }

    pub fn is_expecting_message(&self, ty: MessageType) -> bool {
        self.channel.is_expecting_message(ty)
    }

    // ── Shutdown ────────────────────────────────────────────────────────

    /// Close the channel with a reason code. The close event fires exactly
    /// once no matter how many times or from which side closing happens.
    pub fn close(&self, close_type: CloseType) {
        self.emit_close(close_type);
        self.channel.close();
    }

    fn emit_close(&self, close_type: CloseType) {
        if self.close_emitted.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("peer channel closed: {:?}", close_type);
        let listeners = std::mem::take(&mut *self.listeners.lock().expect("listeners lock"));
        for listener in &listeners.close {
            listener(close_type);
        }
    }

    // ── Subscriptions ───────────────────────────────────────────────────

    /// Register a listener for all messages of one type. The typed `on_*`
    /// methods are the ergonomic front of this.
    pub fn on_message_type(
        &self,
        ty: MessageType,
        listener: impl Fn(&Message) + Send + Sync + 'static,
    ) {
        self.listeners
            .lock()
            .expect("listeners lock")
            .by_type
            .entry(ty)
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn on_message_log(
        &self,
        listener: impl Fn(&Message, &MessageStats) + Send + Sync + 'static,
    ) {
        self.listeners
            .lock()
            .expect("listeners lock")
            .message_log
            .push(Arc::new(listener));
    }

    pub fn on_close(&self, listener: impl Fn(CloseType) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .expect("listeners lock")
            .close
            .push(Arc::new(listener));
    }

    pub fn on_error(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.channel.add_error_listener(listener);
    }

    pub fn on_version(&self, f: impl Fn(&VersionMessage) + Send + Sync + 'static) {
        self.on_message_type(MessageType::Version, move |msg| {
            if let Message::Version(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_verack(&self, f: impl Fn(&VerAckMessage) + Send + Sync + 'static) {
        self.on_message_type(MessageType::VerAck, move |msg| {
            if let Message::VerAck(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_inv(&self, f: impl Fn(&[InvVector]) + Send + Sync + 'static) {
        self.on_message_type(MessageType::Inv, move |msg| {
            if let Message::Inv(vectors) = msg {
                f(vectors)
            }
        });
    }

    pub fn on_get_data(&self, f: impl Fn(&[InvVector]) + Send + Sync + 'static) {
        self.on_message_type(MessageType::GetData, move |msg| {
            if let Message::GetData(vectors) = msg {
                f(vectors)
            }
        });
    }

    pub fn on_get_header(&self, f: impl Fn(&[InvVector]) + Send + Sync + 'static) {
        self.on_message_type(MessageType::GetHeader, move |msg| {
            if let Message::GetHeader(vectors) = msg {
                f(vectors)
            }
        });
    }

    pub fn on_not_found(&self, f: impl Fn(&[InvVector]) + Send + Sync + 'static) {
        self.on_message_type(MessageType::NotFound, move |msg| {
            if let Message::NotFound(vectors) = msg {
                f(vectors)
            }
        });
    }

    pub fn on_get_blocks(&self, f: impl Fn(&GetBlocksMessage) + Send + Sync + 'static) {
        self.on_message_type(MessageType::GetBlocks, move |msg| {
            if let Message::GetBlocks(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_block(&self, f: impl Fn(&Block) + Send + Sync + 'static) {
        self.on_message_type(MessageType::Block, move |msg| {
            if let Message::Block(block) = msg {
                f(block)
            }
        });
    }

    pub fn on_header(&self, f: impl Fn(&BlockHeader) + Send + Sync + 'static) {
        self.on_message_type(MessageType::Header, move |msg| {
            if let Message::Header(header) = msg {
                f(header)
            }
        });
    }

    pub fn on_tx(&self, f: impl Fn(&Transaction) + Send + Sync + 'static) {
        self.on_message_type(MessageType::Tx, move |msg| {
            if let Message::Tx(tx) = msg {
                f(tx)
            }
        });
    }

    pub fn on_mempool(&self, f: impl Fn() + Send + Sync + 'static) {
        self.on_message_type(MessageType::Mempool, move |msg| {
            if let Message::Mempool = msg {
                f()
            }
        });
    }

    pub fn on_reject(&self, f: impl Fn(&RejectMessage) + Send + Sync + 'static) {
        self.on_message_type(MessageType::Reject, move |msg| {
            if let Message::Reject(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_subscribe(&self, f: impl Fn(&Subscription) + Send + Sync + 'static) {
        self.on_message_type(MessageType::Subscribe, move |msg| {
            if let Message::Subscribe(subscription) = msg {
                f(subscription)
            }
        });
    }

    pub fn on_addr(&self, f: impl Fn(&AddrMessage) + Send + Sync + 'static) {
        self.on_message_type(MessageType::Addr, move |msg| {
            if let Message::Addr(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_get_addr(&self, f: impl Fn(&GetAddrMessage) + Send + Sync + 'static) {
        self.on_message_type(MessageType::GetAddr, move |msg| {
            if let Message::GetAddr(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_ping(&self, f: impl Fn(u32) + Send + Sync + 'static) {
        self.on_message_type(MessageType::Ping, move |msg| {
            if let Message::Ping(nonce) = msg {
                f(*nonce)
            }
        });
    }

    pub fn on_pong(&self, f: impl Fn(u32) + Send + Sync + 'static) {
        self.on_message_type(MessageType::Pong, move |msg| {
            if let Message::Pong(nonce) = msg {
                f(*nonce)
            }
        });
    }

    pub fn on_signal(&self, f: impl Fn(&SignalMessage) + Send + Sync + 'static) {
        self.on_message_type(MessageType::Signal, move |msg| {
            if let Message::Signal(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_get_chain_proof(&self, f: impl Fn() + Send + Sync + 'static) {
        self.on_message_type(MessageType::GetChainProof, move |msg| {
            if let Message::GetChainProof = msg {
                f()
            }
        });
    }

    pub fn on_chain_proof(&self, f: impl Fn(&ChainProofMessage) + Send + Sync + 'static) {
        self.on_message_type(MessageType::ChainProof, move |msg| {
            if let Message::ChainProof(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_get_accounts_proof(
        &self,
        f: impl Fn(&GetAccountsProofMessage) + Send + Sync + 'static,
    ) {
        self.on_message_type(MessageType::GetAccountsProof, move |msg| {
            if let Message::GetAccountsProof(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_accounts_proof(&self, f: impl Fn(&AccountsProofMessage) + Send + Sync + 'static) {
        self.on_message_type(MessageType::AccountsProof, move |msg| {
            if let Message::AccountsProof(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_get_accounts_tree_chunk(
        &self,
        f: impl Fn(&GetAccountsTreeChunkMessage) + Send + Sync + 'static,
    ) {
        self.on_message_type(MessageType::GetAccountsTreeChunk, move |msg| {
            if let Message::GetAccountsTreeChunk(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_accounts_tree_chunk(
        &self,
        f: impl Fn(&AccountsTreeChunkMessage) + Send + Sync + 'static,
    ) {
        self.on_message_type(MessageType::AccountsTreeChunk, move |msg| {
            if let Message::AccountsTreeChunk(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_get_transactions_proof(
        &self,
        f: impl Fn(&GetTransactionsProofMessage) + Send + Sync + 'static,
    ) {
        self.on_message_type(MessageType::GetTransactionsProof, move |msg| {
            if let Message::GetTransactionsProof(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_transactions_proof(
        &self,
        f: impl Fn(&TransactionsProofMessage) + Send + Sync + 'static,
    ) {
        self.on_message_type(MessageType::TransactionsProof, move |msg| {
            if let Message::TransactionsProof(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_get_transaction_receipts(
        &self,
        f: impl Fn(&GetTransactionReceiptsMessage) + Send + Sync + 'static,
    ) {
        self.on_message_type(MessageType::GetTransactionReceipts, move |msg| {
            if let Message::GetTransactionReceipts(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_transaction_receipts(
        &self,
        f: impl Fn(&TransactionReceiptsMessage) + Send + Sync + 'static,
    ) {
        self.on_message_type(MessageType::TransactionReceipts, move |msg| {
            if let Message::TransactionReceipts(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_get_block_proof(&self, f: impl Fn(&GetBlockProofMessage) + Send + Sync + 'static) {
        self.on_message_type(MessageType::GetBlockProof, move |msg| {
            if let Message::GetBlockProof(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_block_proof(&self, f: impl Fn(&BlockProofMessage) + Send + Sync + 'static) {
        self.on_message_type(MessageType::BlockProof, move |msg| {
            if let Message::BlockProof(payload) = msg {
                f(payload)
            }
        });
    }

    pub fn on_get_head(&self, f: impl Fn() + Send + Sync + 'static) {
        self.on_message_type(MessageType::GetHead, move |msg| {
            if let Message::GetHead = msg {
                f()
            }
        });
    }

    pub fn on_head(&self, f: impl Fn(&BlockHeader) + Send + Sync + 'static) {
        self.on_message_type(MessageType::Head, move |msg| {
            if let Message::Head(header) = msg {
                f(header)
            }
        });
    }

    // ── Send API ────────────────────────────────────────────────────────

    fn send(&self, message: &Message) -> bool {
        let bytes = message.serialize();
        trace!(
            "sending {:?} message ({} bytes)",
            message.message_type(),
            bytes.len()
        );
        self.channel.send(&bytes)
    }

    pub fn version(&self, msg: VersionMessage) -> bool {
        self.send(&Message::Version(msg))
    }

    pub fn verack(&self, msg: VerAckMessage) -> bool {
        self.send(&Message::VerAck(msg))
    }

    pub fn inv(&self, vectors: Vec<InvVector>) -> bool {
        self.send(&Message::Inv(vectors))
    }

    pub fn get_data(&self, vectors: Vec<InvVector>) -> bool {
        self.send(&Message::GetData(vectors))
    }

    pub fn get_header(&self, vectors: Vec<InvVector>) -> bool {
        self.send(&Message::GetHeader(vectors))
    }

    pub fn not_found(&self, vectors: Vec<InvVector>) -> bool {
        self.send(&Message::NotFound(vectors))
    }

    pub fn get_blocks(&self, msg: GetBlocksMessage) -> bool {
        self.send(&Message::GetBlocks(msg))
    }

    pub fn block(&self, block: Block) -> bool {
        self.send(&Message::Block(block))
    }

    /// Relay an already-serialized block without re-serializing it.
    pub fn raw_block(&self, serialized_block: &[u8]) -> bool {
        let bytes = Message::frame(MessageType::Block, serialized_block);
        trace!("sending raw BLOCK message ({} bytes)", bytes.len());
        self.channel.send(&bytes)
    }

    pub fn header(&self, header: BlockHeader) -> bool {
        self.send(&Message::Header(header))
    }

    pub fn tx(&self, tx: Transaction) -> bool {
        self.send(&Message::Tx(tx))
    }

    pub fn mempool(&self) -> bool {
        self.send(&Message::Mempool)
    }

    pub fn reject(&self, msg: RejectMessage) -> bool {
        self.send(&Message::Reject(msg))
    }

    pub fn subscribe(&self, subscription: Subscription) -> bool {
        self.send(&Message::Subscribe(subscription))
    }

    pub fn addr(&self, msg: AddrMessage) -> bool {
        self.send(&Message::Addr(msg))
    }

    pub fn get_addr(&self, msg: GetAddrMessage) -> bool {
        self.send(&Message::GetAddr(msg))
    }

    pub fn ping(&self, nonce: u32) -> bool {
        self.send(&Message::Ping(nonce))
    }

    pub fn pong(&self, nonce: u32) -> bool {
        self.send(&Message::Pong(nonce))
    }

    pub fn signal(&self, msg: SignalMessage) -> bool {
        self.send(&Message::Signal(msg))
    }

    pub fn get_chain_proof(&self) -> bool {
        self.send(&Message::GetChainProof)
    }

    pub fn chain_proof(&self, msg: ChainProofMessage) -> bool {
        self.send(&Message::ChainProof(msg))
    }

    pub fn get_accounts_proof(&self, msg: GetAccountsProofMessage) -> bool {
        self.send(&Message::GetAccountsProof(msg))
    }

    pub fn accounts_proof(&self, msg: AccountsProofMessage) -> bool {
        self.send(&Message::AccountsProof(msg))
    }

    pub fn get_accounts_tree_chunk(&self, msg: GetAccountsTreeChunkMessage) -> bool {
        self.send(&Message::GetAccountsTreeChunk(msg))
    }

    pub fn accounts_tree_chunk(&self, msg: AccountsTreeChunkMessage) -> bool {
        self.send(&Message::AccountsTreeChunk(msg))
    }

    pub fn get_transactions_proof(&self, msg: GetTransactionsProofMessage) -> bool {
        self.send(&Message::GetTransactionsProof(msg))
    }

    pub fn transactions_proof(&self, msg: TransactionsProofMessage) -> bool {
        self.send(&Message::TransactionsProof(msg))
    }

    pub fn get_transaction_receipts(&self, msg: GetTransactionReceiptsMessage) -> bool {
        self.send(&Message::GetTransactionReceipts(msg))
    }

    pub fn transaction_receipts(&self, msg: TransactionReceiptsMessage) -> bool {
        self.send(&Message::TransactionReceipts(msg))
    }

    pub fn get_block_proof(&self, msg: GetBlockProofMessage) -> bool {
        self.send(&Message::GetBlockProof(msg))
    }

    pub fn block_proof(&self, msg: BlockProofMessage) -> bool {
        self.send(&Message::BlockProof(msg))
    }

    pub fn get_head(&self) -> bool {
        self.send(&Message::GetHead)
    }

    pub fn head(&self, header: BlockHeader) -> bool {
        self.send(&Message::Head(header))
    }
}
