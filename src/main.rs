use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use clade_explorer::app::App;
use clade_explorer::async_task::{self, Task, TaskResult, CHANNEL_CAPACITY};
use clade_explorer::cli::{Cli, Commands};
use clade_explorer::config::Config;
use clade_explorer::error::Result;
use clade_explorer::location::parse_location;
use clade_explorer::{event, main_lib, screenshot, ui};

const LOG_ENV: &str = "CLADE_EXPLORER_LOG";

fn init_logging(verbose: bool) -> Result<()> {
    // Only log when asked to; anything on stdout/stderr would corrupt the TUI
    if let Ok(log_file) = std::env::var(LOG_ENV) {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?;
        env_logger::Builder::new()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .filter_level(log::LevelFilter::Debug)
            .init();
        log::info!("Clade Explorer starting up");
    } else if verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run { url: None });
    let interactive = matches!(command, Commands::Run { .. });
    init_logging(cli.verbose && !interactive)?;

    let config = Config::load(cli.config.as_deref())?;
    let source = main_lib::build_source(&config, cli.fixture.as_deref(), cli.base_url.as_deref())?;

    match command {
        Commands::Run { url } => {
            let final_url = run_interactive(source, url.as_deref().unwrap_or(""), config).await?;
            println!("{}", final_url);
            Ok(())
        }
        Commands::Screenshot {
            url,
            output,
            width,
            height,
        } => screenshot::generate_screenshot(source.as_ref(), &url, config, output.as_deref(), width, height).await,
        Commands::Search { query } => main_lib::run_search(source.as_ref(), &query).await,
    }
}

/// Runs the TUI until the user quits and returns the shareable URL of the
/// final state.
async fn run_interactive(
    source: std::sync::Arc<dyn clade_explorer::source::DataSource>,
    location: &str,
    config: Config,
) -> Result<String> {
    let location = parse_location(location)?;

    // Setup async task channels
    let (task_sender, task_receiver) = mpsc::channel::<Task>(CHANNEL_CAPACITY);
    let (result_sender, mut result_receiver) = mpsc::channel::<TaskResult>(CHANNEL_CAPACITY);

    // Start background worker
    let shutdown = CancellationToken::new();
    let worker_handle = tokio::spawn(async_task::run_worker(
        task_receiver,
        result_sender,
        source,
        shutdown.clone(),
    ));

    let mut app = App::new(location, config, task_sender);
    app.load_current_root();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = event_loop(&mut terminal, &mut app, &mut result_receiver);

    // Cleanup
    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        log::warn!("main: worker ended abnormally: {}", e);
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    outcome?;
    Ok(app.current_url().to_string())
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    result_receiver: &mut mpsc::Receiver<TaskResult>,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    loop {
        app.set_terminal_size(terminal.size()?);

        // Handle forced screen redraw
        if app.ui.force_redraw {
            terminal.clear()?;
            app.ui.force_redraw = false;
            app.ui.dirty = true;
        }

        if app.take_needs_redraw() {
            terminal.draw(|f| ui::draw(f, app))?;
        }

        if crossterm::event::poll(tick_rate)? {
            let event = crossterm::event::read()?;
            if let Err(e) = event::handle_event(event, app) {
                app.ui.status_message = format!("Error handling event: {}", e);
                app.ui.dirty = true;
            }
        }

        // Handle async task results
        while let Ok(result) = result_receiver.try_recv() {
            main_lib::handle_task_result(app, result);
        }

        if app.ui.should_quit {
            return Ok(());
        }
    }
}
