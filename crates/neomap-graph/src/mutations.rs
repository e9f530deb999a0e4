//! Write shortcuts on the client.
//!
//! Every write goes through a batch so the container and its index entries
//! change together; these helpers wrap the single-container case.

use neomap_core::ContainerKind;

use crate::client::GraphClient;
use crate::commit::BatchReceipt;
use crate::entity::GraphEntity;
use crate::error::Result;
use crate::index::index_definition;
use crate::transport::Method;

impl GraphClient {
    // ── Single-container writes ──────────────────────────────────

    /// Validate and save one container in its own batch.
    pub fn save<E: GraphEntity>(&self, entity: &mut E) -> Result<BatchReceipt> {
        let mut tx = self.transaction();
        tx.add_save_operation(entity, true)?;
        tx.execute()
    }

    /// Delete one persisted container and its index entries.
    pub fn delete<E: GraphEntity>(&self, entity: &mut E) -> Result<BatchReceipt> {
        let mut tx = self.transaction();
        tx.add_delete_operation(entity)?;
        tx.execute()
    }

    // ── Indexes ──────────────────────────────────────────────────

    /// Create the named full-text auto index unless this client already did.
    pub fn ensure_auto_index(&self, kind: ContainerKind, name: &str) -> Result<()> {
        let collection = format!("/{}", kind.index_resource());
        let index_path = format!("{collection}/{name}");
        if !self.mark_index_ensured(&index_path) {
            return Ok(());
        }

        match self.request(Method::Post, &collection, Some(&index_definition(name))) {
            Ok(_) => {
                tracing::info!(index = %index_path, "Auto index ensured");
                Ok(())
            }
            Err(err) => {
                self.forget_index(&index_path);
                tracing::warn!(index = %index_path, error = %err, "Auto index creation failed");
                Err(err)
            }
        }
    }
}
