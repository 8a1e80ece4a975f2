use ratatui::{backend::TestBackend, buffer::Buffer, layout::Rect, Terminal};
use std::fs;
use tokio::sync::mpsc;

use crate::app::App;
use crate::async_task::CHANNEL_CAPACITY;
use crate::config::Config;
use crate::error::Result;
use crate::location::parse_location;
use crate::main_lib::settle;
use crate::source::DataSource;
use crate::ui;

/// Load the fragment and selected detail for `location`, then render a
/// single frame of the given size as text.
pub async fn capture(
    source: &dyn DataSource,
    location: &str,
    config: Config,
    width: u16,
    height: u16,
) -> Result<String> {
    let (task_sender, mut task_receiver) = mpsc::channel(CHANNEL_CAPACITY);
    let mut app = App::new(parse_location(location)?, config, task_sender);
    app.set_frame(Rect::new(0, 0, width, height));
    app.load_current_root();
    settle(&mut app, &mut task_receiver, source).await;
    // The panel may have appeared with the selection
    app.set_frame(Rect::new(0, 0, width, height));

    render(&app, width, height)
}

pub fn render(app: &App, width: u16, height: u16) -> Result<String> {
    let backend = TestBackend::new(width, height);
    let mut terminal = Terminal::new(backend)?;
    terminal.draw(|frame| {
        ui::draw(frame, app);
    })?;
    Ok(buffer_to_string(terminal.backend().buffer()))
}

pub async fn generate_screenshot(
    source: &dyn DataSource,
    location: &str,
    config: Config,
    output_path: Option<&str>,
    width: u16,
    height: u16,
) -> Result<()> {
    let screenshot = capture(source, location, config, width, height).await?;

    match output_path {
        Some(path) => {
            fs::write(path, screenshot)?;
            println!("Screenshot saved to: {}", path);
        }
        None => {
            print!("{}", screenshot);
        }
    }

    Ok(())
}

pub fn buffer_to_string(buffer: &Buffer) -> String {
    let mut result = String::new();

    for y in 0..buffer.area().height {
        for x in 0..buffer.area().width {
            let sym = buffer[(x, y)].symbol();
            if sym.is_empty() {
                result.push(' ');
            } else {
                result.push_str(sym);
            }
        }
        result.push('\n');
    }

    result
}
