use std::collections::BTreeSet;

use epiphany_core::AppError;
use uuid::Uuid;

use super::{generation_not_found, Coordinator, DeleteResponse};

impl Coordinator {
    /// Delete a generation with its objects, assets, events and explain rows.
    ///
    /// Live jobs are removed first so no worker writes back into a deleted
    /// row. Object deletes are best-effort: a failure is logged and the rows
    /// are still removed.
    #[tracing::instrument(skip(self), fields(generation.id = %generation_id))]
    pub async fn delete_generation(&self, generation_id: Uuid) -> Result<DeleteResponse, AppError> {
        let generation = self
            .persistence
            .generations
            .get(generation_id)
            .await?
            .ok_or_else(|| generation_not_found(generation_id))?;

        if let Err(e) = self.remove_live_jobs(generation_id).await {
            tracing::warn!(error = %e, "Failed to remove live jobs before delete");
        }

        let assets = self
            .persistence
            .assets
            .list_for_generation(generation_id)
            .await?;

        // Output refs and asset rows usually name the same objects
        let keys: BTreeSet<String> = generation
            .output_refs()
            .into_iter()
            .chain(assets.iter().map(|a| a.url.as_str()))
            .filter_map(|url| self.signer.object_key(url))
            .collect();

        let mut objects_deleted = 0;
        for key in &keys {
            match self.signer.storage().delete(key).await {
                Ok(()) => objects_deleted += 1,
                Err(e) => tracing::warn!(error = %e, key = %key, "Failed to delete object"),
            }
        }

        let deleted = self
            .persistence
            .generations
            .delete_cascade(generation_id)
            .await?;
        tracing::info!(objects_deleted, "Generation deleted");

        Ok(DeleteResponse {
            deleted,
            objects_deleted,
        })
    }

    #[tracing::instrument(skip(self), fields(asset.id = %asset_id))]
    pub async fn delete_asset(&self, asset_id: Uuid) -> Result<DeleteResponse, AppError> {
        let asset = self
            .persistence
            .assets
            .get(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", asset_id)))?;

        let mut objects_deleted = 0;
        if let Some(key) = self.signer.object_key(&asset.url) {
            match self.signer.storage().delete(&key).await {
                Ok(()) => objects_deleted = 1,
                Err(e) => tracing::warn!(error = %e, key = %key, "Failed to delete asset object"),
            }
        }

        let deleted = self.persistence.assets.delete(asset_id).await?;
        Ok(DeleteResponse {
            deleted,
            objects_deleted,
        })
    }
}
