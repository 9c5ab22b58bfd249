//! Detached execution of post-persistence work.
//!
//! `after*` hooks and search indexing run after a mutation has been answered.
//! The core does not own a runtime: a [`Spawner`] can be injected through
//! [`ModelBuilder::spawner`](crate::model::ModelBuilder::spawner). Without
//! one, work goes to the ambient tokio runtime when there is one and is
//! otherwise awaited in place.

use std::fmt::Debug;

use futures::future::BoxFuture;
use tracing::debug;

/// Runs a future to completion without the caller waiting on it.
pub trait Spawner: Send + Sync + Debug {
    fn spawn(&self, task: BoxFuture<'static, ()>);
}

/// Spawns onto the tokio runtime the caller is running in.
///
/// Panics when called outside a tokio runtime, like `tokio::spawn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

impl Spawner for TokioSpawner {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }
}

/// Hands `task` to `spawner`, or falls back to the ambient runtime.
pub(crate) async fn detach(spawner: Option<&dyn Spawner>, task: Option<BoxFuture<'static, ()>>) {
    let Some(task) = task else {
        return;
    };

    if let Some(spawner) = spawner {
        spawner.spawn(task);
        return;
    }

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => {
            debug!("no tokio runtime, running detached work in place");
            task.await;
        }
    }
}
