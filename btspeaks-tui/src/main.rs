/*!
 * btspeaks front panel
 * Pair and Disconnect buttons for the audio sink daemon
 */

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use tokio::time::{interval, Duration};

mod app;
mod client;
mod ui;

use app::{App, Button};
use ui::render_ui;

/// Status is polled every this many UI ticks.
const REFRESH_TICKS: u32 = 10;

#[derive(Parser)]
#[command(name = "btspeaks")]
#[command(about = "Front panel for the btspeaks audio sink")]
struct Cli {
    /// Daemon socket path
    #[arg(short, long, default_value = "/run/btspeaks/btspeaks.sock")]
    socket: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &cli.socket).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

async fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, socket: &str) -> Result<()> {
    let mut app = App::new(socket).await?;

    let mut ticker = interval(Duration::from_millis(100));
    let mut ticks = 0u32;

    loop {
        // Handle events
        if event::poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Left => app.previous_button(),
                    KeyCode::Right | KeyCode::Tab => app.next_button(),
                    KeyCode::Enter | KeyCode::Char(' ') => app.press_selected().await,
                    KeyCode::Char('p') => app.press(Button::Pair).await,
                    KeyCode::Char('d') => app.press(Button::Disconnect).await,
                    KeyCode::Char('r') => app.refresh_status().await,
                    _ => {}
                }
            }
        }

        ticker.tick().await;
        ticks += 1;
        if ticks >= REFRESH_TICKS {
            ticks = 0;
            app.refresh_status().await;
        }

        terminal.draw(|f| render_ui(f, &app))?;
    }
}
