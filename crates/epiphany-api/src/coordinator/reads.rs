use epiphany_core::models::{Asset, Event, EventFilter, Generation, GenerationResponse};
use epiphany_core::AppError;
use serde::Deserialize;
use uuid::Uuid;

use super::{generation_not_found, Coordinator, Page, SignOptions};
use crate::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

/// `page` / `limit` query parameters. Pages start at 1.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    /// Trims a `limit + 1` fetch down to one page
    fn paginate<T>(&self, mut rows: Vec<T>) -> Page<T> {
        let limit = self.limit() as usize;
        let next_page = (rows.len() > limit).then(|| self.page() + 1);
        rows.truncate(limit);
        Page {
            items: rows,
            next_page,
        }
    }
}

impl Coordinator {
    pub async fn list_generations(
        &self,
        page: PageParams,
        sign: SignOptions,
    ) -> Result<Page<GenerationResponse>, AppError> {
        let rows = self
            .persistence
            .generations
            .list(page.offset(), page.limit() + 1)
            .await?;
        let page = page.paginate(rows);

        let mut items = Vec::with_capacity(page.items.len());
        for generation in page.items {
            items.push(self.generation_response(generation, sign).await);
        }
        Ok(Page {
            items,
            next_page: page.next_page,
        })
    }

    pub async fn get_generation(
        &self,
        id: Uuid,
        sign: SignOptions,
    ) -> Result<GenerationResponse, AppError> {
        let generation = self
            .persistence
            .generations
            .get(id)
            .await?
            .ok_or_else(|| generation_not_found(id))?;
        Ok(self.generation_response(generation, sign).await)
    }

    async fn generation_response(
        &self,
        mut generation: Generation,
        sign: SignOptions,
    ) -> GenerationResponse {
        if sign.signed {
            generation.output_url = self
                .signer
                .sign_opt(generation.output_url.as_deref(), sign.ttl)
                .await;
            generation.preview_urls = self
                .signer
                .sign_all(&generation.preview_urls, sign.ttl)
                .await;
        }
        GenerationResponse::from(generation)
    }

    pub async fn list_events(
        &self,
        filter: EventFilter,
        page: PageParams,
    ) -> Result<Page<Event>, AppError> {
        let rows = self
            .persistence
            .events
            .list(&filter, page.offset(), page.limit() + 1)
            .await?;
        Ok(page.paginate(rows))
    }

    pub async fn list_assets(
        &self,
        page: PageParams,
        sign: SignOptions,
    ) -> Result<Page<Asset>, AppError> {
        let rows = self
            .persistence
            .assets
            .list(page.offset(), page.limit() + 1)
            .await?;
        let mut page = page.paginate(rows);
        if sign.signed {
            for asset in page.items.iter_mut() {
                asset.url = self.signer.sign(&asset.url, sign.ttl).await;
            }
        }
        Ok(page)
    }
}
