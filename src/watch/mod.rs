//! Watches the chain for contracts worth reporting
//!
//! [`ContractWatcher`] polls the chain head through a [`RotatingDispatcher`], walks every new
//! block, and inspects its transactions concurrently. Contracts holding more than the configured
//! balance are sent, once each, to the [`ContractStream`] handed out at construction

mod seen;
pub mod test_utils;
mod worker;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use tokio::select;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::WatchConfig;
use crate::dispatcher::RotatingDispatcher;
use crate::rpc::ChainRpc;

pub use self::seen::SeenSet;

/// A contract found holding more than the reporting threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractEvent {
    pub address: Address,

    /// Balance in wei, as of the inspection
    pub balance: U256,
}

impl ContractEvent {
    /// EIP-55 checksummed address
    pub fn checksummed(&self) -> String {
        self.address.to_checksum(None)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("could not fetch the chain head from any of the {0} endpoints")]
    NoChainHead(usize),

    #[error("event stream closed by the consumer")]
    StreamClosed,

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Last block considered processed. Scanning resumes right after it
    pub from_block: Option<u64>,
    pub poll_interval: Duration,
    pub max_workers: usize,
    pub min_balance: U256,
    pub buffer_size: usize,
}

impl WatchSettings {
    pub fn new(config: &WatchConfig, endpoints: usize) -> Self {
        Self {
            from_block: config.from_block,
            poll_interval: config.poll_interval(),
            max_workers: config.max_workers.unwrap_or(endpoints * 2).max(1),
            min_balance: config.min_balance,
            buffer_size: config.buffer_size.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initializing,
    Polling,
    ProcessingBlockRange { from: u64, to: u64 },
    Idle,
}

/// Receiving end of a watcher
///
/// Events arrive in the order their inspection completed, which is not necessarily chain order.
/// The stream ends once the watcher stops
#[derive(Debug)]
pub struct ContractStream {
    events: mpsc::Receiver<ContractEvent>,
}

impl ContractStream {
    /// Waits for the next event. `None` once the watcher stopped
    pub async fn next(&mut self) -> Option<ContractEvent> {
        self.events.recv().await
    }
}

pub struct ContractWatcher<C> {
    dispatcher: Arc<RotatingDispatcher<C>>,

    /// Addresses under evaluation or already reported
    seen: Arc<SeenSet>,

    settings: WatchSettings,

    /// Highest fully processed block
    cursor: u64,

    state: State,

    events: mpsc::Sender<ContractEvent>,

    /// Cancellation token for graceful shutdown
    cancellation_token: CancellationToken,
}

impl<C: ChainRpc + 'static> ContractWatcher<C> {
    pub fn new(
        dispatcher: Arc<RotatingDispatcher<C>>,
        settings: WatchSettings,
        cancellation_token: CancellationToken,
    ) -> (Self, ContractStream) {
        let (events, rcv) = mpsc::channel(settings.buffer_size.max(1));

        let watcher = Self {
            dispatcher,
            seen: SeenSet::new(),
            settings,
            cursor: 0,
            state: State::Initializing,
            events,
            cancellation_token,
        };

        (watcher, ContractStream { events: rcv })
    }

    /// Runs until cancelled, or until the stream is dropped
    ///
    /// Only fails if no starting point can be established
    #[instrument(name = "watch", skip(self), fields(endpoints = self.dispatcher.len()))]
    pub async fn run(mut self) -> Result<(), WatchError> {
        while !self.cancellation_token.is_cancelled() {
            match self.step().await {
                Ok(()) => {}
                Err(WatchError::Cancelled) | Err(WatchError::StreamClosed) => break,
                Err(e) => {
                    error!("{}", e);
                    return Err(e);
                }
            }
        }

        info!(cursor = self.cursor, "closing");
        Ok(())
    }

    async fn step(&mut self) -> Result<(), WatchError> {
        self.state = match self.state {
            State::Initializing => {
                self.initialize().await?;
                State::Polling
            }
            State::Polling => self.poll().await?,
            State::Idle => {
                self.idle().await?;
                State::Polling
            }
            State::ProcessingBlockRange { from, to } => {
                self.process_range(from, to).await?;
                State::Polling
            }
        };

        Ok(())
    }

    /// Sets the starting cursor, trying each endpoint once for the current head
    async fn initialize(&mut self) -> Result<(), WatchError> {
        for attempt in 1..=self.dispatcher.len() {
            if self.cancellation_token.is_cancelled() {
                return Err(WatchError::Cancelled);
            }

            match self.cancellable(self.dispatcher.block_number()).await? {
                Ok(head) => {
                    self.cursor = self.settings.from_block.unwrap_or(head);
                    info!(head, cursor = self.cursor, "starting");
                    return Ok(());
                }
                Err(e) => warn!(attempt, "failed to fetch chain head: {}", e),
            }
        }

        Err(WatchError::NoChainHead(self.dispatcher.len()))
    }

    async fn poll(&mut self) -> Result<State, WatchError> {
        let state = match self.cancellable(self.dispatcher.block_number()).await? {
            Ok(head) if head > self.cursor => State::ProcessingBlockRange {
                from: self.cursor + 1,
                to: head,
            },
            Ok(_) => State::Idle,
            Err(e) => {
                warn!("failed to poll chain head: {}", e);
                State::Idle
            }
        };

        Ok(state)
    }

    async fn idle(&self) -> Result<(), WatchError> {
        trace!(event = "wait", cursor = self.cursor);
        select! {
            _ = self.cancellation_token.cancelled() => Err(WatchError::Cancelled),
            _ = sleep(self.settings.poll_interval) => Ok(()),
        }
    }

    async fn process_range(&mut self, from: u64, to: u64) -> Result<(), WatchError> {
        debug!(from, to, "new block(s) found");

        for number in from..=to {
            if self.cancellation_token.is_cancelled() {
                return Err(WatchError::Cancelled);
            }

            self.process_block(number).await?;
            self.cursor = self.cursor.max(number);
        }

        Ok(())
    }

    /// Inspects every transaction of a block, and waits for all of them
    ///
    /// A block that can't be fetched is skipped
    async fn process_block(&mut self, number: u64) -> Result<(), WatchError> {
        let hashes = match self
            .cancellable(self.dispatcher.block_transactions(number))
            .await?
        {
            Ok(Some(hashes)) => hashes,
            Ok(None) => {
                warn!(block = number, "block not found, skipping");
                return Ok(());
            }
            Err(e) => {
                warn!(block = number, "failed to fetch block, skipping: {}", e);
                return Ok(());
            }
        };

        trace!(block = number, txs = hashes.len());

        let semaphore = Arc::new(Semaphore::new(self.settings.max_workers));
        let mut workers = JoinSet::new();

        for hash in hashes {
            let dispatcher = self.dispatcher.clone();
            let seen = self.seen.clone();
            let semaphore = semaphore.clone();
            let token = self.cancellation_token.clone();
            let min_balance = self.settings.min_balance;

            workers.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                select! {
                    biased;
                    _ = token.cancelled() => None,
                    event = worker::inspect(&*dispatcher, &seen, min_balance, hash) => event,
                }
            });
        }

        while let Some(result) = workers.join_next().await {
            match result {
                Ok(Some(event)) => self.emit(event).await?,
                Ok(None) => {}
                Err(e) => warn!(block = number, "worker failed: {}", e),
            }
        }

        Ok(())
    }

    /// Races a call against cancellation. Cancellation wins if both are ready
    async fn cancellable<T>(&self, call: impl Future<Output = T>) -> Result<T, WatchError> {
        select! {
            biased;
            _ = self.cancellation_token.cancelled() => Err(WatchError::Cancelled),
            res = call => Ok(res),
        }
    }

    async fn emit(&self, event: ContractEvent) -> Result<(), WatchError> {
        debug!(address = %event.checksummed(), balance = %event.balance, "contract found");

        select! {
            _ = self.cancellation_token.cancelled() => Err(WatchError::Cancelled),
            sent = self.events.send(event) => sent.map_err(|_| WatchError::StreamClosed),
        }
    }
}
