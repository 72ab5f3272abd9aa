use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};

use crate::nodes::Endpoint;
use crate::rpc::{ChainRpc, HttpRpc, Receipt, RpcError};

/// Spreads calls over a fixed pool of nodes, in rotation
///
/// Every call goes to the next node in line, so no single free-tier endpoint takes the whole
/// load, and one misbehaving node only fails the calls that happen to land on it. Nodes are
/// never evicted: a degraded one keeps its turn and its failures are handled by the caller
#[derive(Debug)]
pub struct RotatingDispatcher<C> {
    clients: Vec<C>,
    cursor: AtomicUsize,
}

impl<C> RotatingDispatcher<C> {
    pub fn new(clients: Vec<C>) -> Result<Self> {
        if clients.is_empty() {
            return Err(eyre!("dispatcher needs at least one endpoint"));
        }

        Ok(Self {
            clients,
            cursor: AtomicUsize::new(0),
        })
    }

    /// The client whose turn it is. Never blocks
    pub fn next(&self) -> &C {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[i]
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }
}

impl RotatingDispatcher<HttpRpc> {
    pub fn connect(endpoints: &[Endpoint], timeout: Duration) -> Result<Self> {
        let clients = endpoints
            .iter()
            .map(|e| HttpRpc::new(&e.url, timeout))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(clients)
    }
}

#[async_trait]
impl<C: ChainRpc> ChainRpc for RotatingDispatcher<C> {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.next().block_number().await
    }

    async fn block_transactions(&self, number: u64) -> Result<Option<Vec<B256>>, RpcError> {
        self.next().block_transactions(number).await
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        self.next().transaction_receipt(hash).await
    }

    async fn code(&self, address: Address) -> Result<Bytes, RpcError> {
        self.next().code(address).await
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        self.next().balance(address).await
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::rpc::test_utils::{spawn_node, Behavior};

    #[test]
    fn test_empty_pool() {
        assert!(RotatingDispatcher::<u8>::new(vec![]).is_err());
    }

    #[test]
    fn test_cycles_in_order() -> Result<()> {
        let dispatcher = RotatingDispatcher::new(vec!['a', 'b', 'c'])?;

        let picked: String = (0..7).map(|_| *dispatcher.next()).collect();

        assert_eq!(picked, "abcabca");

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fair_under_contention() -> Result<()> {
        let dispatcher = Arc::new(RotatingDispatcher::new(vec![0usize, 1, 2, 3])?);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    (0..1000)
                        .map(|_| *dispatcher.next())
                        .fold(HashMap::new(), |mut acc, i| {
                            *acc.entry(i).or_insert(0) += 1;
                            acc
                        })
                })
            })
            .collect();

        let mut totals: HashMap<usize, usize> = HashMap::new();
        for handle in handles {
            for (i, n) in handle.await? {
                *totals.entry(i).or_insert(0) += n;
            }
        }

        assert_eq!(totals.len(), 4);
        assert!(totals.values().all(|n| *n == 2000));

        Ok(())
    }

    #[tokio::test]
    async fn test_rotates_rpc_calls() -> Result<()> {
        let a = spawn_node(Behavior::Healthy).await;
        let b = spawn_node(Behavior::Healthy).await;
        let endpoints = vec![Endpoint::new("a", &a.url), Endpoint::new("b", &b.url)];

        let dispatcher = RotatingDispatcher::connect(&endpoints, Duration::from_secs(2))?;
        for _ in 0..5 {
            dispatcher.block_number().await?;
        }

        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_failing_node_only_fails_its_turn() -> Result<()> {
        let good = spawn_node(Behavior::Healthy).await;
        let bad = spawn_node(Behavior::RateLimited { after: 0 }).await;
        let endpoints = vec![Endpoint::new("good", &good.url), Endpoint::new("bad", &bad.url)];

        let dispatcher = RotatingDispatcher::connect(&endpoints, Duration::from_secs(2))?;

        assert!(dispatcher.block_number().await.is_ok());
        assert!(dispatcher.block_number().await.is_err());
        assert!(dispatcher.block_number().await.is_ok());

        Ok(())
    }
}
