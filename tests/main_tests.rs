use async_trait::async_trait;
use clade_explorer::app::App;
use clade_explorer::async_task::{run_worker, Task, TaskResult, CHANNEL_CAPACITY};
use clade_explorer::cli::{Cli, Commands};
use clade_explorer::config::Config;
use clade_explorer::detail::DetailEntry;
use clade_explorer::error::FetchError;
use clade_explorer::location::{parse_location, NODE_ID_PARAM, SELECTED_NODE_PARAM};
use clade_explorer::main_lib::{handle_task_result, settle};
use clade_explorer::search::SearchDisplay;
use clade_explorer::selection::SelectionState;
use clade_explorer::source::{DataSource, DetailRecord, FixtureDataSource, SearchCandidate};
use clade_explorer::tree::Node;
use clap::Parser;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

const FIXTURE: &str = "fixtures/vertebrates.json";
const FELIDAE: &str = "57a8baf1343108933d3a8f36";
const ARCHOSAURIA: &str = "587eb692edafd34956b1dd1a";

fn fixture_source() -> FixtureDataSource {
    FixtureDataSource::from_file(FIXTURE).expect("fixture should load")
}

fn new_app(location: &str) -> (App, mpsc::Receiver<Task>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let app = App::new(parse_location(location).unwrap(), Config::default(), tx);
    (app, rx)
}

/// A running worker plus the app wired to it, like the interactive loop.
struct Harness {
    app: App,
    results: mpsc::Receiver<TaskResult>,
    shutdown: CancellationToken,
}

impl Harness {
    fn start(location: &str, source: Arc<dyn DataSource>) -> Self {
        let (task_sender, task_receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let (result_sender, results) = mpsc::channel(CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        tokio::spawn(run_worker(task_receiver, result_sender, source, shutdown.clone()));
        let app = App::new(parse_location(location).unwrap(), Config::default(), task_sender);
        Self { app, results, shutdown }
    }

    /// Apply exactly `n` results in arrival order.
    async fn pump(&mut self, n: usize) {
        for _ in 0..n {
            let result = timeout(Duration::from_secs(2), self.results.recv())
                .await
                .expect("worker result in time")
                .expect("worker alive");
            handle_task_result(&mut self.app, result);
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Counts detail fetches and answers each after a delay.
struct CountingSource {
    inner: FixtureDataSource,
    detail_calls: AtomicUsize,
}

#[async_trait]
impl DataSource for CountingSource {
    async fn fetch_tree(&self, root: Option<String>) -> Result<Node, FetchError> {
        self.inner.fetch_tree(root).await
    }

    async fn fetch_detail(&self, id: String) -> Result<DetailRecord, FetchError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.inner.fetch_detail(id).await
    }

    async fn search(&self, query: String) -> Result<Vec<SearchCandidate>, FetchError> {
        self.inner.search(query).await
    }
}

/// Answers shorter queries more slowly, so earlier keystrokes finish last.
struct SlowPrefixSource {
    inner: FixtureDataSource,
}

#[async_trait]
impl DataSource for SlowPrefixSource {
    async fn fetch_tree(&self, root: Option<String>) -> Result<Node, FetchError> {
        self.inner.fetch_tree(root).await
    }

    async fn fetch_detail(&self, id: String) -> Result<DetailRecord, FetchError> {
        self.inner.fetch_detail(id).await
    }

    async fn search(&self, query: String) -> Result<Vec<SearchCandidate>, FetchError> {
        let delay = 200u64.saturating_sub(query.len() as u64 * 40);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.inner.search(query).await
    }
}

mod startup {
    use super::*;

    #[tokio::test]
    async fn test_initial_load_through_worker() {
        let mut harness = Harness::start("", Arc::new(fixture_source()));
        harness.app.load_current_root();
        harness.pump(1).await;

        let fragment = harness.app.fragment.as_ref().unwrap();
        assert_eq!(fragment.root().name, "Vertebrata");
        assert!(!harness.app.ui.is_loading);
        // depth-2 nodes start collapsed
        assert!(harness.app.diagram.get("5845ab8ca1b14c1ba5f1e1c4").unwrap().collapsed);
        assert!(harness.app.diagram.get("5845abd2a1b14c1ba5f1e1c5").is_none());
    }

    #[tokio::test]
    async fn test_url_seeds_root_and_selection() {
        let location = format!("?node_id={}&selected_node_id={}", ARCHOSAURIA, "5845ad02a1b14c1ba5f1e1c9");
        let (mut app, mut rx) = new_app(&location);
        assert_eq!(
            app.selection.state(),
            &SelectionState::Selected("5845ad02a1b14c1ba5f1e1c9".to_string())
        );
        app.load_current_root();
        settle(&mut app, &mut rx, &fixture_source()).await;

        assert_eq!(app.fragment.as_ref().unwrap().root_id(), ARCHOSAURIA);
        match app.selected_detail() {
            Some((_, DetailEntry::Resolved(record))) => {
                assert_eq!(record.other_names.as_deref(), Some("T. rex"));
                assert!(record.image.is_some());
            }
            other => panic!("expected resolved detail, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_root_renders_nothing() {
        let (mut app, mut rx) = new_app("?node_id=000000000000000000000000");
        app.load_current_root();
        settle(&mut app, &mut rx, &fixture_source()).await;

        assert!(app.fragment.is_none());
        assert!(app.diagram.nodes.is_empty());
        assert_eq!(app.fragment_error, Some(FetchError::NotFound));
    }
}

mod selection_and_details {
    use super::*;

    #[tokio::test]
    async fn test_select_sequence_rewrites_url() {
        let (mut app, mut rx) = new_app("?node_id=5845aaf3a1b14c1ba5f1e1c2");
        app.load_current_root();
        settle(&mut app, &mut rx, &fixture_source()).await;

        let mut seen = Vec::new();
        for id in ["a", "b", "a"] {
            app.click_node(id);
            seen.push(app.history.borrow().param(SELECTED_NODE_PARAM));
        }
        assert_eq!(seen, vec![Some("a".to_string()), Some("b".to_string()), Some("a".to_string())]);
        // replace, never push
        assert_eq!(app.history.borrow().len(), 1);
        assert_eq!(
            app.history.borrow().param(NODE_ID_PARAM).as_deref(),
            Some("5845aaf3a1b14c1ba5f1e1c2")
        );
    }

    #[tokio::test]
    async fn test_selection_round_trips_through_url() {
        let (mut app, _rx) = new_app("");
        app.click_node(FELIDAE);
        let url = app.current_url().to_string();

        let (reloaded, _rx) = new_app(&url);
        assert_eq!(reloaded.selection.selected_id(), Some(FELIDAE));
    }

    #[tokio::test]
    async fn test_repeated_gets_share_one_fetch() {
        let source = Arc::new(CountingSource {
            inner: fixture_source(),
            detail_calls: AtomicUsize::new(0),
        });
        let mut harness = Harness::start("", source.clone());

        harness.app.details.get(FELIDAE);
        harness.app.click_node(FELIDAE);
        harness.app.details.get(FELIDAE);
        harness.pump(1).await;

        assert_eq!(source.detail_calls.load(Ordering::SeqCst), 1);
        let first = harness.app.details.get(FELIDAE).clone();
        let second = harness.app.details.get(FELIDAE).clone();
        assert_eq!(first, second);
        assert!(matches!(first, DetailEntry::Resolved(ref r) if r.description.is_some()));
        assert_eq!(source.detail_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_detail_fails_and_reselect_retries() {
        let mut harness = Harness::start("", Arc::new(fixture_source()));
        harness.app.click_node("ffffffffffffffffffffffff");
        harness.pump(1).await;
        assert!(matches!(
            harness.app.details.peek("ffffffffffffffffffffffff"),
            DetailEntry::Failed(FetchError::NotFound)
        ));

        harness.app.click_node("ffffffffffffffffffffffff");
        assert_eq!(harness.app.details.peek("ffffffffffffffffffffffff"), &DetailEntry::Pending);
        harness.pump(1).await;
        assert!(matches!(
            harness.app.details.peek("ffffffffffffffffffffffff"),
            DetailEntry::Failed(_)
        ));
    }
}

mod search {
    use super::*;

    #[tokio::test]
    async fn test_latest_keystroke_wins_out_of_order() {
        let mut harness = Harness::start("", Arc::new(SlowPrefixSource { inner: fixture_source() }));
        harness.app.open_search();
        for c in "fel".chars() {
            harness.app.search.push_char(c);
        }
        // "fel" answers first; "f" and "fe" land afterwards and are dropped
        harness.pump(3).await;

        assert_eq!(harness.app.search.query(), "fel");
        match harness.app.search.display() {
            SearchDisplay::Results(items) => assert_eq!(items[0].id, FELIDAE),
            other => panic!("expected results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_results_and_suggestions() {
        let mut harness = Harness::start("", Arc::new(fixture_source()));
        harness.app.open_search();
        assert!(matches!(harness.app.search.display(), SearchDisplay::Suggestions(items) if items.len() == 5));

        harness.app.search.set_query("zzzzqqq");
        harness.pump(1).await;
        assert!(matches!(harness.app.search.display(), SearchDisplay::NoResults("zzzzqqq")));
    }

    #[tokio::test]
    async fn test_choosing_result_selects_and_reveals() {
        let mut harness = Harness::start("", Arc::new(fixture_source()));
        harness.app.load_current_root();
        harness.pump(1).await;
        assert!(harness.app.diagram.get(FELIDAE).is_none());

        harness.app.open_search();
        harness.app.search.set_query("felidae");
        harness.pump(1).await;
        let chosen = harness.app.choose_search_result();

        assert_eq!(chosen.as_deref(), Some(FELIDAE));
        assert!(!harness.app.search.is_open());
        assert_eq!(harness.app.selection.selected_id(), Some(FELIDAE));
        assert!(harness.app.diagram.get(FELIDAE).is_some());
        assert_eq!(harness.app.focus.as_deref(), Some(FELIDAE));
    }
}

mod navigation {
    use super::*;

    #[tokio::test]
    async fn test_reroot_then_back() {
        let mut harness = Harness::start("", Arc::new(fixture_source()));
        harness.app.load_current_root();
        harness.pump(1).await;

        harness.app.click_node(ARCHOSAURIA);
        harness.pump(1).await;
        assert!(harness.app.reroot_at_selection());
        harness.pump(1).await;

        assert_eq!(harness.app.fragment.as_ref().unwrap().root_id(), ARCHOSAURIA);
        assert_eq!(harness.app.selection.selected_id(), None);
        assert!(!harness.app.layout.has_interacted());

        harness.app.pan_cells(3, 3);
        assert!(harness.app.go_back());
        harness.pump(1).await;
        assert_eq!(harness.app.fragment.as_ref().unwrap().root().name, "Vertebrata");
        assert!(!harness.app.layout.has_interacted());
        // the detail fetched earlier is still cached
        assert!(matches!(harness.app.details.peek(ARCHOSAURIA), DetailEntry::Resolved(_)));
    }

    #[tokio::test]
    async fn test_superseded_fragment_dropped() {
        let (mut app, mut rx) = new_app("");
        app.load_current_root();
        app.navigate_to_root(ARCHOSAURIA);

        let source = fixture_source();
        let mut tasks = Vec::new();
        while let Ok(task) = rx.try_recv() {
            tasks.push(task);
        }
        assert_eq!(tasks.len(), 2);
        // answer the newer request first
        for task in tasks.into_iter().rev() {
            let result = clade_explorer::async_task::execute(&source, task).await;
            handle_task_result(&mut app, result);
        }
        assert_eq!(app.fragment.as_ref().unwrap().root_id(), ARCHOSAURIA);
    }
}

mod cli {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let cli = assert_ok!(Cli::try_parse_from(["clade-explorer", "--fixture", FIXTURE]));
        assert!(cli.command.is_none());
        assert_eq!(cli.fixture.as_deref(), Some(std::path::Path::new(FIXTURE)));
    }

    #[test]
    fn test_screenshot_arguments() {
        let cli = assert_ok!(Cli::try_parse_from([
            "clade-explorer",
            "screenshot",
            "--fixture",
            FIXTURE,
            "--url",
            "?node_id=x",
            "--width",
            "80",
        ]));
        match cli.command {
            Some(Commands::Screenshot { url, width, height, output }) => {
                assert_eq!(url, "?node_id=x");
                assert_eq!(width, 80);
                assert_eq!(height, 40);
                assert!(output.is_none());
            }
            _ => panic!("expected screenshot command"),
        }
    }

    #[test]
    fn test_search_requires_query() {
        assert_err!(Cli::try_parse_from(["clade-explorer", "search"]));
    }
}
