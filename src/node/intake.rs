use crate::error::Result;
use crate::node::SharedState;
use crate::storage::LedgerStore;
use log::debug;

/// Copy every pool transaction this node has not seen into its queue.
///
/// Returns how many were queued. A store error stops the pass early;
/// transactions queued before it stay queued and the rest are picked up
/// on the next poll.
pub fn poll_once(state: &SharedState, store: &LedgerStore) -> Result<usize> {
    let pool = store.transaction_ids()?;

    let mut guard = state.lock();
    let node_id = guard.get_node_id().clone();
    let mut ingested = 0;

    for txid in pool {
        if guard.has_seen(&txid) {
            continue;
        }
        let Some(tx) = store.get_transaction(&txid)? else {
            continue;
        };
        store.enqueue_pending(&node_id, &tx)?;
        guard.mark_seen(&txid);
        guard.enqueue(tx);
        ingested += 1;
    }

    if ingested > 0 {
        debug!("Node {node_id} queued {ingested} new transactions");
    }
    Ok(ingested)
}
