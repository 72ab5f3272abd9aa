use std::sync::Arc;

use alloy_primitives::{B256, U256};
use tracing::{debug, trace};

use super::{ContractEvent, SeenSet};
use crate::rpc::ChainRpc;

/// Inspects one transaction, returning an event if it touched a contract worth reporting
///
/// Each network call goes through `rpc` separately, so with a rotating dispatcher every step may
/// hit a different node. Any failure abandons the transaction and releases the address
pub(super) async fn inspect<R: ChainRpc + ?Sized>(
    rpc: &R,
    seen: &Arc<SeenSet>,
    min_balance: U256,
    hash: B256,
) -> Option<ContractEvent> {
    let receipt = match rpc.transaction_receipt(hash).await {
        Ok(Some(receipt)) => receipt,
        Ok(None) => {
            trace!(%hash, "receipt not available");
            return None;
        }
        Err(e) => {
            debug!(%hash, "failed to fetch receipt: {}", e);
            return None;
        }
    };

    let address = receipt.candidate()?;
    let claim = seen.claim(address)?;

    match rpc.code(address).await {
        Ok(code) if code.is_empty() => return None,
        Ok(_) => {}
        Err(e) => {
            debug!(%address, "failed to fetch code: {}", e);
            return None;
        }
    }

    let balance = match rpc.balance(address).await {
        Ok(balance) => balance,
        Err(e) => {
            debug!(%address, "failed to fetch balance: {}", e);
            return None;
        }
    };

    if balance <= min_balance {
        trace!(%address, %balance, "below threshold");
        return None;
    }

    claim.confirm();
    Some(ContractEvent { address, balance })
}
