//! In-memory fakes for the chain, distributor and storage seams.

use crate::chain::ChainReader;
use crate::distributor::{Distributor, DistributorState, PushError};
use crate::scanner::Transfer;
use crate::storage::{ArtifactStore, StorageError};
use airdrop_claims::{ArtifactHead, ProofsPayload};
use alloy::{
    primitives::{Address, Bytes, LogData, B256, U256},
    rpc::types::{Filter, Log},
    signers::local::PrivateKeySigner,
    sol_types::SolEvent,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mint log for `to` at `block`, token id = block number.
pub fn mint_log(nft: Address, to: Address, block: u64) -> Log {
    let topics = vec![
        Transfer::SIGNATURE_HASH,
        B256::ZERO,
        to.into_word(),
        B256::from(U256::from(block)),
    ];
    Log {
        inner: alloy::primitives::Log {
            address: nft,
            data: LogData::new_unchecked(topics, Bytes::new()),
        },
        block_number: Some(block),
        ..Default::default()
    }
}

pub struct FakeChain {
    head: u64,
    code: HashSet<Address>,
    logs: Vec<Log>,
    failing_from: Option<u64>,
    queries: Mutex<Vec<(u64, u64)>>,
}

impl FakeChain {
    pub fn new(head: u64) -> Self {
        Self {
            head,
            code: HashSet::new(),
            logs: Vec::new(),
            failing_from: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_code(mut self, address: Address) -> Self {
        self.code.insert(address);
        self
    }

    pub fn with_mint(mut self, nft: Address, to: Address, block: u64) -> Self {
        self.logs.push(mint_log(nft, to, block));
        self
    }

    pub fn with_log(mut self, log: Log) -> Self {
        self.logs.push(log);
        self
    }

    /// Every range containing `block` fails.
    pub fn failing_logs_from(mut self, block: u64) -> Self {
        self.failing_from = Some(block);
        self
    }

    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn code_at(&self, address: Address) -> anyhow::Result<Bytes> {
        Ok(if self.code.contains(&address) {
            Bytes::from_static(&[0x60, 0x80])
        } else {
            Bytes::new()
        })
    }

    async fn head_block(&self) -> anyhow::Result<u64> {
        Ok(self.head)
    }

    async fn logs(&self, filter: &Filter) -> anyhow::Result<Vec<Log>> {
        let from = filter.get_from_block().unwrap_or(0);
        let to = filter.get_to_block().unwrap_or(self.head);
        self.queries.lock().push((from, to));

        if let Some(block) = self.failing_from {
            if (from..=to).contains(&block) {
                anyhow::bail!("query returned more than 10000 results");
            }
        }

        Ok(self
            .logs
            .iter()
            .filter(|log| filter.address.matches(&log.address()))
            .filter(|log| log.block_number.is_some_and(|b| (from..=to).contains(&b)))
            .cloned()
            .collect())
    }
}

pub struct FakeDistributor {
    address: Address,
    state: Mutex<DistributorState>,
    /// What `state()` reports when it lags behind `head()`
    stale_head: Option<ArtifactHead>,
    fail_reads: bool,
    fail_push: Option<String>,
    fail_head: bool,
    /// `None` makes `token_balance()` fail
    balance: Option<U256>,
    pushes: Mutex<Vec<ArtifactHead>>,
}

impl FakeDistributor {
    pub fn new(address: Address, head: ArtifactHead, reward_amount: U256) -> Self {
        Self {
            address,
            state: Mutex::new(DistributorState {
                token: Address::repeat_byte(0x70),
                head,
                reward_amount,
            }),
            stale_head: None,
            fail_reads: false,
            fail_push: None,
            fail_head: false,
            balance: Some(U256::MAX),
            pushes: Mutex::new(Vec::new()),
        }
    }

    /// `state()` reports `head` while `head()` returns the real value.
    pub fn with_stale_state(mut self, head: ArtifactHead) -> Self {
        self.stale_head = Some(head);
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn failing_head(mut self) -> Self {
        self.fail_head = true;
        self
    }

    pub fn with_balance(mut self, balance: U256) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn failing_balance(mut self) -> Self {
        self.balance = None;
        self
    }

    pub fn failing_push(mut self, message: &str) -> Self {
        self.fail_push = Some(message.to_string());
        self
    }

    pub fn pushes(&self) -> Vec<ArtifactHead> {
        self.pushes.lock().clone()
    }

    pub fn current_head(&self) -> ArtifactHead {
        self.state.lock().head
    }
}

#[async_trait]
impl Distributor for FakeDistributor {
    fn address(&self) -> Address {
        self.address
    }

    async fn state(&self) -> anyhow::Result<DistributorState> {
        if self.fail_reads {
            anyhow::bail!("execution reverted");
        }
        let mut state = *self.state.lock();
        if let Some(stale) = self.stale_head {
            state.head = stale;
        }
        Ok(state)
    }

    async fn head(&self) -> anyhow::Result<ArtifactHead> {
        if self.fail_reads || self.fail_head {
            anyhow::bail!("connection reset");
        }
        Ok(self.state.lock().head)
    }

    async fn token_balance(&self, token: Address) -> anyhow::Result<U256> {
        anyhow::ensure!(token == self.state.lock().token, "not the reward token");
        self.balance.ok_or_else(|| anyhow::anyhow!("balanceOf() reverted"))
    }

    async fn set_root(
        &self,
        _signer: &PrivateKeySigner,
        head: ArtifactHead,
    ) -> Result<B256, PushError> {
        self.pushes.lock().push(head);
        if let Some(message) = &self.fail_push {
            return Err(PushError::Send(message.clone()));
        }
        self.state.lock().head = head;
        Ok(B256::repeat_byte(0xee))
    }
}

pub struct MemoryStore {
    name: &'static str,
    content: Mutex<Option<String>>,
    fail_reads: bool,
    fail_writes: bool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            content: Mutex::new(None),
            fail_reads: false,
            fail_writes: false,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn holding(self, payload: &ProofsPayload) -> Self {
        *self.content.lock() = payload.to_json_pretty().ok();
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn payload(&self) -> Option<ProofsPayload> {
        self.content
            .lock()
            .as_deref()
            .and_then(|json| ProofsPayload::from_json(json).ok())
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    fn name(&self) -> &'static str {
        self.name
    }

    fn location(&self) -> String {
        format!("memory://{}", self.name)
    }

    async fn read(&self) -> Result<Option<ProofsPayload>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::Io {
                path: self.name.into(),
                source: std::io::Error::other("read refused"),
            });
        }
        match self.content.lock().as_deref() {
            Some(json) => Ok(Some(ProofsPayload::from_json(json)?)),
            None => Ok(None),
        }
    }

    async fn write(&self, json: &str) -> Result<String, StorageError> {
        if self.fail_writes {
            return Err(StorageError::Io {
                path: self.name.into(),
                source: std::io::Error::other("disk full"),
            });
        }
        *self.content.lock() = Some(json.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(self.location())
    }
}
