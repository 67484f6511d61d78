/*!
 * Front panel buttons
 * Pair and Disconnect push buttons on GPIO lines
 */

use anyhow::{Context, Result};
use gpiocdev::line::{Bias, EdgeDetection, Offset};
use gpiocdev::tokio::AsyncRequest;
use gpiocdev::Request;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::ButtonsConfig;
use crate::controller::ControlCommand;
use crate::ipc::ask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    Pair,
    Disconnect,
}

#[derive(Debug, Clone, Copy)]
struct ButtonLines {
    pair: Offset,
    disconnect: Offset,
}

impl ButtonLines {
    fn press_for(&self, offset: Offset) -> Option<Press> {
        if offset == self.pair {
            Some(Press::Pair)
        } else if offset == self.disconnect {
            Some(Press::Disconnect)
        } else {
            None
        }
    }
}

pub struct ButtonPanel {
    chip: String,
    lines: ButtonLines,
    request: AsyncRequest,
}

impl ButtonPanel {
    /// Claim the button lines. `None` when no chip is configured.
    pub fn open(config: &ButtonsConfig) -> Result<Option<Self>> {
        let Some(chip) = &config.chip else {
            return Ok(None);
        };
        let (bias, edge) = if config.pressed_when_low {
            (Bias::PullUp, EdgeDetection::FallingEdge)
        } else {
            (Bias::PullDown, EdgeDetection::RisingEdge)
        };

        let request = Request::builder()
            .on_chip(chip)
            .with_consumer("btspeaksd")
            .with_lines(&[config.pair_line, config.disconnect_line])
            .with_bias(bias)
            .with_edge_detection(edge)
            .with_debounce_period(Duration::from_millis(config.debounce_ms))
            .request()
            .with_context(|| {
                format!(
                    "cannot claim lines {} and {} on {}",
                    config.pair_line, config.disconnect_line, chip
                )
            })?;

        Ok(Some(Self {
            chip: chip.clone(),
            lines: ButtonLines {
                pair: config.pair_line,
                disconnect: config.disconnect_line,
            },
            request: AsyncRequest::new(request),
        }))
    }

    pub fn chip(&self) -> &str {
        &self.chip
    }

    /// Forward presses until the lines fail or the controller goes away.
    pub async fn run(self, commands: mpsc::Sender<ControlCommand>) {
        loop {
            let event = match self.request.read_edge_event().await {
                Ok(event) => event,
                Err(e) => {
                    error!("Lost the front panel buttons on {}: {}", self.chip, e);
                    return;
                }
            };
            let Some(press) = self.lines.press_for(event.offset) else {
                continue;
            };
            if !press_button(press, &commands).await {
                debug!("Sink controller stopped; releasing front panel buttons");
                return;
            }
        }
    }
}

/// Hand one press to the controller. `false` once the controller has stopped.
pub async fn press_button(press: Press, commands: &mpsc::Sender<ControlCommand>) -> bool {
    match press {
        Press::Pair => match ask(commands, |reply| ControlCommand::Pair { reply }).await {
            Ok(true) => info!("Pair button pressed"),
            Ok(false) => info!("Pair button pressed before the sink was ready"),
            Err(_) => return false,
        },
        Press::Disconnect => match ask(commands, |reply| ControlCommand::Disconnect { reply }).await {
            Ok(Some(count)) => info!("Disconnect button pressed, {} device(s) connected", count),
            Ok(None) => info!("Disconnect button pressed before the sink was ready"),
            Err(_) => return false,
        },
    }
    true
}
