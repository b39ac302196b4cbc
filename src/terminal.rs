//! The interactive chat session: read a line, make one call, redraw the history.
//!
//! Input lines are translated before they reach the wire:
//!
//! * `exit` (any case) ends the session
//! * an empty line or `/history` (any case) asks for the history without posting
//! * anything else is posted as a message

use std::io::{self, Write};

use tokio::io::{AsyncBufRead, Lines};

use crate::client::ChatClient;
use crate::error::ClientError;
use crate::FETCH_SENTINEL;

/// ANSI: move the cursor home and clear the screen.
pub const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";
pub const HISTORY_HEADER: &str = "--- CHAT HISTORY ---";
pub const HISTORY_FOOTER: &str = "--------------------";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Exit,
    Fetch,
    Say(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.eq_ignore_ascii_case("exit") {
        Input::Exit
    } else if line.is_empty() || line.eq_ignore_ascii_case("/history") {
        Input::Fetch
    } else {
        Input::Say(line.to_string())
    }
}

/// Clear the screen and print the history, oldest first, between header and footer.
pub fn render_history<W: Write>(out: &mut W, history: &[String]) -> io::Result<()> {
    write!(out, "{}", CLEAR_SCREEN)?;
    writeln!(out, "{}", HISTORY_HEADER)?;
    for msg in history {
        writeln!(out, "{}", msg)?;
    }
    writeln!(out, "{}", HISTORY_FOOTER)?;
    out.flush()
}

/// Prompt for a display name and keep its first word. End of input gives an empty name.
pub async fn read_name<R, W>(input: &mut Lines<R>, out: &mut W) -> io::Result<String>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "Enter your name: ")?;
    out.flush()?;
    let line = input.next_line().await?.unwrap_or_default();
    Ok(line.split_whitespace().next().unwrap_or_default().to_string())
}

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed `exit`.
    Exit,
    /// Input closed or could not be read.
    EndOfInput,
}

pub struct Session<R, W> {
    name: String,
    client: ChatClient,
    input: Lines<R>,
    out: W,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(name: String, client: ChatClient, input: Lines<R>, out: W) -> Session<R, W> {
        Session {
            name,
            client,
            input,
            out,
        }
    }

    /// Run the prompt loop until exit, end of input, or a fatal connection error.
    pub async fn run(mut self) -> Result<SessionEnd, ClientError> {
        writeln!(
            self.out,
            "Connected as {}. Type 'exit' to quit.",
            self.name
        )
        .map_err(ClientError::Terminal)?;

        loop {
            write!(self.out, "[{}]> ", self.name).map_err(ClientError::Terminal)?;
            self.out.flush().map_err(ClientError::Terminal)?;

            let line = match self.input.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    log::info!("End of input. Shutting down.");
                    return self.finish(SessionEnd::EndOfInput).await;
                }
                Err(err) => {
                    log::warn!("Input error: {}. Shutting down.", err);
                    return self.finish(SessionEnd::EndOfInput).await;
                }
            };

            let message = match parse_input(&line) {
                Input::Exit => {
                    writeln!(self.out, "Client shutting down...").map_err(ClientError::Terminal)?;
                    return self.finish(SessionEnd::Exit).await;
                }
                Input::Fetch => FETCH_SENTINEL.to_string(),
                Input::Say(text) => text,
            };

            let history = match self.client.send_message(&self.name, &message).await {
                Ok(history) => history,
                Err(err) if err.is_fatal() => return Err(err),
                // Non-fatal call errors keep the session alive and show an empty history.
                Err(err) => {
                    log::warn!("Call failed: {}", err);
                    Vec::new()
                }
            };
            render_history(&mut self.out, &history).map_err(ClientError::Terminal)?;
        }
    }

    async fn finish(self, end: SessionEnd) -> Result<SessionEnd, ClientError> {
        if let Err(err) = self.client.close().await {
            log::debug!("closing connection: {}", err);
        }
        Ok(end)
    }
}
