//! In-memory chain for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use molt_types::Network;

use crate::network::NetworkProfile;
use crate::relayer::{MintConfirmation, ReceiptStatus, Relayer, SignedMint};
use crate::{ChainError, Result};

/// Mock contract address used in the profile.
const MOCK_CONTRACT: &str = "0x000000000000000000000000000000000000d417";

/// What happens to the next broadcast mints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    /// Mined and confirmed immediately.
    Confirm,
    /// Mined but reverted.
    Revert,
    /// Refused by the node; nothing is broadcast.
    SubmitFails,
    /// Mined on chain, but the confirmation wait times out.
    ConfirmAfterTimeout,
    /// Never mined until [`MockRelayer::mine`] is called.
    Stall,
    /// Accepted and mined, but the broadcast call itself errors.
    LostResponse,
}

#[derive(Debug, Clone)]
struct MockTx {
    recipient: String,
    metadata_uri: String,
    token_id: u64,
    state: TxState,
    emit_event: bool,
    block_number: u64,
    minted_at: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Pending,
    Mined,
    Reverted,
}

#[derive(Debug, Clone)]
struct SignedTx {
    recipient: String,
    metadata_uri: String,
}

#[derive(Debug)]
struct ChainState {
    mode: MockMode,
    emit_event: bool,
    next_token_id: u64,
    next_block: u64,
    block_time: Option<u64>,
    signed: HashMap<String, SignedTx>,
    txs: HashMap<String, MockTx>,
    tx_order: Vec<String>,
}

/// Relayer backed by a `HashMap` "chain".
pub struct MockRelayer {
    profile: NetworkProfile,
    state: Mutex<ChainState>,
    sign_count: AtomicU32,
    submit_count: AtomicU32,
}

impl MockRelayer {
    pub fn new(network: Network) -> Self {
        Self {
            profile: NetworkProfile::defaults(network).with_contract(MOCK_CONTRACT),
            state: Mutex::new(ChainState {
                mode: MockMode::Confirm,
                emit_event: true,
                next_token_id: 1,
                next_block: 100,
                block_time: None,
                signed: HashMap::new(),
                txs: HashMap::new(),
                tx_order: Vec::new(),
            }),
            sign_count: AtomicU32::new(0),
            submit_count: AtomicU32::new(0),
        }
    }

    /// Token id the next mint will receive.
    pub fn with_next_token_id(self, token_id: u64) -> Self {
        self.update(|s| s.next_token_id = token_id);
        self
    }

    pub fn with_mode(self, mode: MockMode) -> Self {
        self.set_mode(mode);
        self
    }

    pub fn set_mode(&self, mode: MockMode) {
        self.update(|s| s.mode = mode);
    }

    /// Whether receipts carry the `DailyMint` event.
    pub fn set_emit_event(&self, emit: bool) {
        self.update(|s| s.emit_event = emit);
    }

    /// Block timestamp stamped on subsequent mints. Unset means receipts
    /// carry no chain time.
    pub fn set_block_time(&self, timestamp: Option<u64>) {
        self.update(|s| s.block_time = timestamp);
    }

    /// Mine a stalled transaction.
    pub fn mine(&self, tx_hash: &str) {
        self.update(|s| {
            if let Some(tx) = s.txs.get_mut(tx_hash) {
                if tx.state == TxState::Pending {
                    tx.state = TxState::Mined;
                }
            }
        });
    }

    /// Number of broadcast attempts, including refused ones.
    pub fn submit_count(&self) -> u32 {
        self.submit_count.load(Ordering::SeqCst)
    }

    /// Number of mined, non-reverted mints across all recipients.
    pub fn mined_count(&self) -> usize {
        self.read(|s| s.txs.values().filter(|tx| tx.state == TxState::Mined).count())
            .unwrap_or(0)
    }

    fn update(&self, f: impl FnOnce(&mut ChainState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }

    fn read<T>(&self, f: impl FnOnce(&ChainState) -> T) -> Result<T> {
        let state = self
            .state
            .lock()
            .map_err(|_| ChainError::Rpc("mock chain poisoned".into()))?;
        Ok(f(&state))
    }

    fn confirmation(tx_hash: &str, tx: &MockTx) -> MintConfirmation {
        MintConfirmation {
            tx_hash: tx_hash.to_string(),
            token_id: tx.emit_event.then_some(tx.token_id),
            block_number: Some(tx.block_number),
            minted_at: tx.minted_at,
        }
    }
}

#[async_trait]
impl Relayer for MockRelayer {
    fn profile(&self) -> &NetworkProfile {
        &self.profile
    }

    async fn sign(&self, recipient: &str, metadata_uri: &str) -> Result<SignedMint> {
        let n = self.sign_count.fetch_add(1, Ordering::SeqCst) + 1;
        let tx_hash = format!("0x{n:064x}");
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChainError::Rpc("mock chain poisoned".into()))?;
        state.signed.insert(
            tx_hash.clone(),
            SignedTx {
                recipient: recipient.to_string(),
                metadata_uri: metadata_uri.to_string(),
            },
        );
        Ok(SignedMint {
            tx_hash,
            raw: format!("{recipient}:{metadata_uri}").into_bytes(),
        })
    }

    async fn broadcast(&self, signed: &SignedMint) -> Result<()> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChainError::Rpc("mock chain poisoned".into()))?;

        // Rebroadcasting a known transaction is a no-op, like a real node.
        if state.txs.contains_key(&signed.tx_hash) {
            return Ok(());
        }
        let tx = state
            .signed
            .get(&signed.tx_hash)
            .cloned()
            .ok_or_else(|| ChainError::ContractUnavailable("invalid signature".into()))?;

        let tx_state = match state.mode {
            MockMode::SubmitFails => {
                return Err(ChainError::ContractUnavailable("mock contract offline".into()))
            }
            MockMode::Confirm | MockMode::ConfirmAfterTimeout | MockMode::LostResponse => {
                TxState::Mined
            }
            MockMode::Revert => TxState::Reverted,
            MockMode::Stall => TxState::Pending,
        };

        let token_id = if tx_state == TxState::Reverted {
            0
        } else {
            let id = state.next_token_id;
            state.next_token_id += 1;
            id
        };
        let block_number = state.next_block;
        state.next_block += 1;

        let emit_event = state.emit_event;
        let minted_at = state.block_time;
        state.txs.insert(
            signed.tx_hash.clone(),
            MockTx {
                recipient: tx.recipient,
                metadata_uri: tx.metadata_uri,
                token_id,
                state: tx_state,
                emit_event,
                block_number,
                minted_at,
            },
        );
        state.tx_order.push(signed.tx_hash.clone());

        if state.mode == MockMode::LostResponse {
            return Err(ChainError::Rpc("request timed out".into()));
        }
        Ok(())
    }

    async fn await_confirmation(&self, tx_hash: &str, timeout: Duration) -> Result<MintConfirmation> {
        let (tx, mode) = self.read(|s| (s.txs.get(tx_hash).cloned(), s.mode))?;
        let tx = tx.ok_or_else(|| ChainError::Rpc(format!("unknown tx {tx_hash}")))?;
        let timed_out = ChainError::ConfirmationTimeout {
            tx_hash: tx_hash.to_string(),
            waited: timeout,
        };
        match (tx.state, mode) {
            (TxState::Reverted, _) => Err(ChainError::TransactionReverted(tx_hash.to_string())),
            (TxState::Pending, _) | (TxState::Mined, MockMode::ConfirmAfterTimeout) => {
                tokio::time::sleep(timeout).await;
                Err(timed_out)
            }
            (TxState::Mined, _) => Ok(Self::confirmation(tx_hash, &tx)),
        }
    }

    async fn receipt(&self, tx_hash: &str) -> Result<ReceiptStatus> {
        self.read(|s| match s.txs.get(tx_hash) {
            None => ReceiptStatus::Unknown,
            Some(tx) => match tx.state {
                TxState::Pending => ReceiptStatus::Pending,
                TxState::Reverted => ReceiptStatus::Reverted,
                TxState::Mined => ReceiptStatus::Confirmed(Self::confirmation(tx_hash, tx)),
            },
        })
    }

    async fn timeline(&self, recipient: &str) -> Result<Vec<u64>> {
        self.read(|s| {
            s.tx_order
                .iter()
                .filter_map(|hash| s.txs.get(hash))
                .filter(|tx| tx.state == TxState::Mined && tx.recipient.eq_ignore_ascii_case(recipient))
                .map(|tx| tx.token_id)
                .collect()
        })
    }

    async fn token_uri(&self, token_id: u64) -> Result<String> {
        self.read(|s| {
            s.txs
                .values()
                .find(|tx| tx.state == TxState::Mined && tx.token_id == token_id)
                .map(|tx| tx.metadata_uri.clone())
        })?
        .ok_or_else(|| ChainError::ContractUnavailable(format!("nonexistent token {token_id}")))
    }
}
