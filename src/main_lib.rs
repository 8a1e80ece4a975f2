// Library module containing testable functions from main.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::app::App;
use crate::async_task::{self, Task, TaskResult};
use crate::config::Config;
use crate::error::{ExplorerError, Result};
use crate::source::{DataSource, FixtureDataSource, HttpDataSource, ImageEnrichedSource, WikipediaImageLookup};

/// Route a worker result to the component that asked for it. Each component
/// decides for itself whether the response is still current.
pub fn handle_task_result(app: &mut App, result: TaskResult) {
    match result {
        TaskResult::TreeLoaded { root, request, result } => {
            log::debug!("main: tree response #{} for {:?}", request, root);
            app.apply_fragment(request, result);
        }
        TaskResult::DetailLoaded { id, request, result } => {
            if app.details.resolve(&id, request, result) && app.selection.is_selected(&id) {
                app.ui.dirty = true;
            }
        }
        TaskResult::SearchCompleted { query, token, result } => {
            app.search.apply_response(token, &query, result);
        }
    }
}

/// Run every queued task to completion on the current task, feeding results
/// back into the app, until nothing is left to do. Used where there is no
/// event loop: headless rendering and tests.
pub async fn settle(app: &mut App, tasks: &mut mpsc::Receiver<Task>, source: &dyn DataSource) {
    while let Ok(task) = tasks.try_recv() {
        let result = async_task::execute(source, task).await;
        handle_task_result(app, result);
    }
}

/// Data source selected by CLI flags and config. CLI flags win over the
/// config file; a fixture wins over a base URL.
pub fn build_source(
    config: &Config,
    fixture: Option<&Path>,
    base_url: Option<&str>,
) -> Result<Arc<dyn DataSource>> {
    let fixture: Option<PathBuf> = fixture.map(Path::to_path_buf).or_else(|| config.source.fixture.clone());
    let base_url = base_url.map(str::to_string).or_else(|| config.source.base_url.clone());

    let source: Arc<dyn DataSource> = match (fixture, base_url) {
        (Some(path), _) => {
            log::info!("main: serving fixture {}", path.display());
            let latency = Duration::from_millis(config.source.latency_ms);
            Arc::new(FixtureDataSource::from_file(&path)?.with_latency(latency))
        }
        (None, Some(url)) => {
            log::info!("main: using backend {}", url);
            Arc::new(HttpDataSource::new(&url)?)
        }
        (None, None) => {
            return Err(ExplorerError::from(
                "no data source: pass --fixture or --base-url, or set one in the config",
            ))
        }
    };

    if config.source.images {
        return Ok(Arc::new(ImageEnrichedSource::new(source, Arc::new(WikipediaImageLookup::new()?))));
    }
    Ok(source)
}

/// Print search candidates for `query`, one per line.
pub async fn run_search(source: &dyn DataSource, query: &str) -> Result<()> {
    let candidates = source.search(query.to_string()).await?;
    if candidates.is_empty() {
        println!("No results found for {}", query);
        return Ok(());
    }
    for candidate in candidates {
        match candidate.other_names.as_deref().filter(|s| !s.is_empty()) {
            Some(other) => println!("{}\t{}\t({})", candidate.id, candidate.label(), other),
            None => println!("{}\t{}", candidate.id, candidate.label()),
        }
    }
    Ok(())
}
