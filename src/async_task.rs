use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::source::{DataSource, DetailRecord, SearchCandidate};
use crate::tree::Node;

/// Capacity of the task and result channels
pub const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    LoadTree { root: Option<String>, request: u64 },
    FetchDetail { id: String, request: u64 },
    Search { query: String, token: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    TreeLoaded {
        root: Option<String>,
        request: u64,
        result: Result<Node, FetchError>,
    },
    DetailLoaded {
        id: String,
        request: u64,
        result: Result<DetailRecord, FetchError>,
    },
    SearchCompleted {
        query: String,
        token: u64,
        result: Result<Vec<SearchCandidate>, FetchError>,
    },
}

/// Receives tasks and runs each one as its own tokio task, so responses come
/// back in completion order rather than request order. Requests are never
/// aborted once started; the worker only stops taking new ones on shutdown.
pub async fn run_worker(
    mut task_receiver: mpsc::Receiver<Task>,
    result_sender: mpsc::Sender<TaskResult>,
    source: Arc<dyn DataSource>,
    shutdown: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("worker: shutdown requested");
                break;
            }
            task = task_receiver.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        log::debug!("worker: starting {:?}", task);
        let source = Arc::clone(&source);
        let sender = result_sender.clone();
        tokio::spawn(async move {
            let result = execute(source.as_ref(), task).await;
            if sender.send(result).await.is_err() {
                // Main loop has dropped the receiver
                log::debug!("worker: result dropped, receiver closed");
            }
        });
    }
}

pub async fn execute(source: &dyn DataSource, task: Task) -> TaskResult {
    match task {
        Task::LoadTree { root, request } => {
            let result = source.fetch_tree(root.clone()).await;
            TaskResult::TreeLoaded { root, request, result }
        }
        Task::FetchDetail { id, request } => {
            let result = source.fetch_detail(id.clone()).await;
            TaskResult::DetailLoaded { id, request, result }
        }
        Task::Search { query, token } => {
            let result = source.search(query.clone()).await;
            TaskResult::SearchCompleted { query, token, result }
        }
    }
}
