use sqlx::PgPool;
use std::sync::Arc;

use epiphany_core::models::QueueName;

use crate::memory::InMemoryJobQueue;
use crate::postgres::PgJobQueue;
use crate::queue::JobQueue;

/// The four queues, addressable by name and iterable in lookup order
/// (image, video, edit, explain)
#[derive(Clone)]
pub struct QueueSet {
    queues: [Arc<dyn JobQueue>; 4],
}

fn slot(name: QueueName) -> usize {
    match name {
        QueueName::GenerateImage => 0,
        QueueName::GenerateVideo => 1,
        QueueName::EditImage => 2,
        QueueName::Explain => 3,
    }
}

impl QueueSet {
    pub fn from_fn(mut build: impl FnMut(QueueName) -> Arc<dyn JobQueue>) -> Self {
        Self {
            queues: QueueName::ALL.map(&mut build),
        }
    }

    pub fn in_memory() -> Self {
        Self::from_fn(|name| Arc::new(InMemoryJobQueue::new(name)) as Arc<dyn JobQueue>)
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self::from_fn(|name| Arc::new(PgJobQueue::new(pool.clone(), name)) as Arc<dyn JobQueue>)
    }

    pub fn get(&self, name: QueueName) -> &Arc<dyn JobQueue> {
        &self.queues[slot(name)]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn JobQueue>> {
        self.queues.iter()
    }
}
