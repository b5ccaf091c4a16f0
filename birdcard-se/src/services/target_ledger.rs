//! Last item shown on each shared target
//!
//! Display-only republishes are skipped when the target already shows the
//! item, so rebinding many sessions to the same item costs one publish.

use birdcard_common::Item;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;

use crate::types::ClientError;

/// Result of a ledger sync
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerSync {
    /// Target already showed the item
    Unchanged,
    /// Display was republished; `previous` is what it showed before
    Republished { previous: Option<Item> },
}

#[derive(Default)]
pub struct TargetLedger {
    displayed: Mutex<HashMap<String, Item>>,
}

impl TargetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the content publish for `item` and note it as shown
    ///
    /// Shares the ledger lock with [`TargetLedger::sync`], so the ledger
    /// always names the last item the target actually received.
    pub async fn publish_content<F, Fut>(
        &self,
        target_id: &str,
        item: &Item,
        publish: F,
    ) -> Result<(), ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ClientError>>,
    {
        let mut displayed = self.displayed.lock().await;
        publish().await?;
        displayed.insert(target_id.to_string(), item.clone());
        Ok(())
    }

    pub async fn last(&self, target_id: &str) -> Option<Item> {
        self.displayed.lock().await.get(target_id).cloned()
    }

    /// Run `publish` only if the target shows something other than `item`
    ///
    /// The ledger lock is held across the publish so concurrent syncs for
    /// the same change collapse into one call. A failed publish leaves the
    /// ledger untouched.
    pub async fn sync<F, Fut>(
        &self,
        target_id: &str,
        item: &Item,
        publish: F,
    ) -> Result<LedgerSync, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ClientError>>,
    {
        let mut displayed = self.displayed.lock().await;
        let previous = displayed.get(target_id).cloned();
        if previous.as_ref().map(|p| p.id.as_str()) == Some(item.id.as_str()) {
            return Ok(LedgerSync::Unchanged);
        }

        publish().await?;
        displayed.insert(target_id.to_string(), item.clone());
        Ok(LedgerSync::Republished { previous })
    }
}
