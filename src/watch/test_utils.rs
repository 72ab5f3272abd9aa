#![cfg(test)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::sleep;

use crate::rpc::{ChainRpc, Receipt, RpcError};

pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000_000_000_000_000u64)
}

pub fn hash(n: u8) -> B256 {
    B256::repeat_byte(n)
}

/// Which call an in-memory chain should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fail {
    Head,
    Block(u64),
    Receipt,
    Code,
    Balance,
}

#[derive(Debug, Default)]
struct State {
    head: u64,
    blocks: HashMap<u64, Vec<B256>>,
    receipts: HashMap<B256, Receipt>,
    code: HashMap<Address, Bytes>,
    balances: HashMap<Address, U256>,
    failing: HashSet<Fail>,
    delay: Duration,
}

/// An in-memory chain answering the same way a node would
#[derive(Debug, Default)]
pub struct FakeChain {
    state: Mutex<State>,
    head_calls: AtomicUsize,
    code_calls: AtomicUsize,
}

impl FakeChain {
    pub fn new(head: u64) -> Self {
        let chain = Self::default();
        chain.state.lock().head = head;
        chain
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().head = head;
    }

    pub fn block(&self, number: u64, txs: &[B256]) {
        self.state.lock().blocks.insert(number, txs.to_vec());
    }

    /// A contract creation, leaving `address` with code and `balance`
    pub fn deploy(&self, tx: B256, address: Address, balance: U256) {
        let mut state = self.state.lock();
        state.receipts.insert(
            tx,
            Receipt {
                contract_address: Some(address),
                to: None,
            },
        );
        state
            .code
            .insert(address, Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]));
        state.balances.insert(address, balance);
    }

    /// A plain call to `to`
    pub fn call(&self, tx: B256, to: Address) {
        self.state.lock().receipts.insert(
            tx,
            Receipt {
                contract_address: None,
                to: Some(to),
            },
        );
    }

    /// An externally owned account
    pub fn account(&self, address: Address, balance: U256) {
        self.state.lock().balances.insert(address, balance);
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().balances.insert(address, balance);
    }

    pub fn fail(&self, fail: Fail) {
        self.state.lock().failing.insert(fail);
    }

    pub fn recover(&self, fail: Fail) {
        self.state.lock().failing.remove(&fail);
    }

    /// Makes head and block lookups take `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn code_calls(&self) -> usize {
        self.code_calls.load(Ordering::SeqCst)
    }

    fn check(&self, fail: Fail) -> Result<(), RpcError> {
        if self.state.lock().failing.contains(&fail) {
            return Err(RpcError::Rpc {
                code: -32000,
                message: format!("{:?} unavailable", fail),
            });
        }
        Ok(())
    }

    async fn lag(&self) {
        let delay = self.state.lock().delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl ChainRpc for FakeChain {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        self.lag().await;
        self.check(Fail::Head)?;
        Ok(self.state.lock().head)
    }

    async fn block_transactions(&self, number: u64) -> Result<Option<Vec<B256>>, RpcError> {
        self.lag().await;
        self.check(Fail::Block(number))?;
        let state = self.state.lock();
        if number > state.head {
            return Ok(None);
        }
        Ok(Some(state.blocks.get(&number).cloned().unwrap_or_default()))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        self.check(Fail::Receipt)?;
        Ok(self.state.lock().receipts.get(&hash).cloned())
    }

    async fn code(&self, address: Address) -> Result<Bytes, RpcError> {
        self.code_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Fail::Code)?;
        Ok(self
            .state
            .lock()
            .code
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        self.check(Fail::Balance)?;
        Ok(self
            .state
            .lock()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }
}
