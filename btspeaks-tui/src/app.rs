use anyhow::Result;
use chrono::{DateTime, Local, Utc};

use crate::client::{Request, Response, SinkClient, SinkStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Pair,
    Disconnect,
}

impl Button {
    pub fn label(self) -> &'static str {
        match self {
            Button::Pair => "Pair",
            Button::Disconnect => "Disconnect",
        }
    }

    fn request(self) -> Request {
        match self {
            Button::Pair => Request::Pair,
            Button::Disconnect => Request::Disconnect,
        }
    }
}

pub struct App {
    pub status: Option<SinkStatus>,
    pub selected: Button,
    pub message: Option<String>,
    pub last_refresh: Option<DateTime<Local>>,
    client: SinkClient,
}

impl App {
    pub async fn new(socket_path: &str) -> Result<Self> {
        let mut app = Self {
            status: None,
            selected: Button::Pair,
            message: None,
            last_refresh: None,
            client: SinkClient::new(socket_path.to_string()),
        };

        // Load initial data
        app.refresh_status().await;
        Ok(app)
    }

    pub fn next_button(&mut self) {
        self.selected = match self.selected {
            Button::Pair => Button::Disconnect,
            Button::Disconnect => Button::Pair,
        };
    }

    pub fn previous_button(&mut self) {
        self.next_button();
    }

    pub async fn press_selected(&mut self) {
        self.press(self.selected).await;
    }

    pub async fn press(&mut self, button: Button) {
        self.selected = button;
        self.message = Some(match self.client.send_request(button.request()).await {
            Ok(Response::Success { message }) => message,
            Ok(Response::Error { message }) => format!("{} failed: {}", button.label(), message),
            Ok(Response::Status { .. }) => format!("{}: unexpected reply", button.label()),
            Err(e) => format!("Daemon unreachable: {}", e),
        });
        self.refresh_status().await;
    }

    /// Daemon errors end up in the message line rather than tearing down the UI.
    pub async fn refresh_status(&mut self) {
        match self.client.send_request(Request::Status).await {
            Ok(Response::Status { status }) => {
                self.status = Some(status);
                self.last_refresh = Some(Local::now());
            }
            Ok(Response::Error { message }) => self.message = Some(message),
            Ok(Response::Success { .. }) => {}
            Err(e) => {
                self.status = None;
                self.message = Some(format!("Daemon unreachable: {}", e));
            }
        }
    }

    /// Milliseconds left in the current discoverable window.
    pub fn discoverable_remaining_ms(&self) -> Option<i64> {
        let until = self.status.as_ref()?.discoverable_until?;
        let remaining = (until - Utc::now()).num_milliseconds();
        (remaining > 0).then_some(remaining)
    }
}
