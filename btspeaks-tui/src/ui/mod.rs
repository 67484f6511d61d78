/*!
 * btspeaks front panel layout
 */

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::app::{App, Button};

// Conservative color palette
const BLUE: Color = Color::Rgb(100, 149, 237);
const GRAY: Color = Color::Rgb(128, 128, 128);
const WHITE: Color = Color::Rgb(255, 255, 255);
const GREEN: Color = Color::Rgb(34, 139, 34);
const RED: Color = Color::Rgb(220, 20, 60);

pub fn render_ui(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),    // Status + devices
            Constraint::Length(5), // Buttons
            Constraint::Length(3), // Message line
        ])
        .split(f.area());

    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[0]);

    render_status_panel(f, panels[0], app);
    render_devices_panel(f, panels[1], app);
    render_buttons(f, rows[1], app);
    render_message(f, rows[2], app);
}

fn flag(label: &str, on: bool) -> Line<'static> {
    let (text, color) = if on { ("yes", GREEN) } else { ("no", RED) };
    Line::from(vec![
        Span::styled(format!("{}: ", label), Style::default().fg(GRAY)),
        Span::styled(text, Style::default().fg(color)),
    ])
}

fn render_status_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Audio Sink")
        .border_style(Style::default().fg(BLUE));

    let Some(status) = &app.status else {
        let paragraph = Paragraph::new("Daemon not reachable")
            .style(Style::default().fg(GRAY))
            .block(block)
            .alignment(Alignment::Center);
        f.render_widget(paragraph, area);
        return;
    };

    let discoverable = match app.discoverable_remaining_ms() {
        Some(ms) => Span::styled(format!("for {} ms", ms), Style::default().fg(GREEN)),
        None => Span::styled("no", Style::default().fg(GRAY)),
    };
    let refreshed = app
        .last_refresh
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());

    let content = vec![
        Line::from(vec![Span::styled(
            status.friendly_name.clone(),
            Style::default().fg(WHITE).add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        flag("Adapter present", status.adapter_present),
        flag("Adapter powered", status.adapter_enabled),
        flag("Sink ready", status.sink_ready),
        flag("Voice feedback", status.speech_available),
        Line::from(vec![
            Span::styled("Discoverable: ", Style::default().fg(GRAY)),
            discoverable,
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("Up since: ", Style::default().fg(GRAY)),
            Span::styled(
                status.started_at.format("%Y-%m-%d %H:%M UTC").to_string(),
                Style::default().fg(WHITE),
            ),
        ]),
        Line::from(vec![
            Span::styled("Refreshed: ", Style::default().fg(GRAY)),
            Span::styled(refreshed, Style::default().fg(WHITE)),
        ]),
    ];

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn render_devices_panel(f: &mut Frame, area: Rect, app: &App) {
    let devices = app
        .status
        .as_ref()
        .map(|s| s.connected_devices.as_slice())
        .unwrap_or_default();

    let items: Vec<ListItem> = if devices.is_empty() {
        vec![ListItem::new(Line::from(Span::styled(
            "No connected sources",
            Style::default().fg(GRAY),
        )))]
    } else {
        devices
            .iter()
            .map(|device| {
                ListItem::new(Line::from(vec![
                    Span::styled("● ", Style::default().fg(GREEN)),
                    Span::styled(
                        device.name.clone().unwrap_or_else(|| "a device".to_string()),
                        Style::default().fg(WHITE),
                    ),
                    Span::styled(format!("  {}", device.address), Style::default().fg(GRAY)),
                ]))
            })
            .collect()
    };

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Connected Sources")
            .border_style(Style::default().fg(GRAY)),
    );
    f.render_widget(list, area);
}

fn render_buttons(f: &mut Frame, area: Rect, app: &App) {
    let ready = app.status.as_ref().is_some_and(|s| s.controls_ready);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    for (button, column) in [Button::Pair, Button::Disconnect].into_iter().zip(columns.iter()) {
        let selected = app.selected == button;
        let border_style = if selected {
            Style::default().fg(BLUE).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(GRAY)
        };
        let text_style = match (selected, ready) {
            (true, true) => Style::default().bg(BLUE).fg(WHITE),
            (false, true) => Style::default().fg(WHITE),
            (_, false) => Style::default().fg(GRAY),
        };
        let hotkey = match button {
            Button::Pair => "[p]",
            Button::Disconnect => "[d]",
        };

        let paragraph = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(format!(" {} ", button.label()), text_style)),
        ])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(hotkey)
                .border_style(border_style),
        )
        .alignment(Alignment::Center);
        f.render_widget(paragraph, *column);
    }
}

fn render_message(f: &mut Frame, area: Rect, app: &App) {
    let line = match &app.message {
        Some(message) => Line::from(Span::styled(message.clone(), Style::default().fg(WHITE))),
        None => Line::from(Span::styled(
            "[←/→] Select  [Enter] Press  [r] Refresh  [q] Quit",
            Style::default().fg(GRAY),
        )),
    };
    f.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::TOP)),
        area,
    );
}
