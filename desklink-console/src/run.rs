//! Console state machine: discover → request → authorization wait →
//! drive the remote session.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use desklink_core::config::ConsoleConfig;
use desklink_core::protocol::{InputCommand, Payload, SessionSummary, Side};
use desklink_core::{AuthorizationOutcome, BrokerClient, RelayError};

use crate::input::{parse_command, ParsedCommand, HELP_TEXT};
use crate::view::{decode_frame, newest_frame, FrameSink};

/// How an active session ended on this side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The broker reported the session inactive or gone.
    PeerLeft,
    /// The operator typed quit (or closed stdin).
    OperatorQuit,
}

pub struct Console {
    client: BrokerClient,
    config: ConsoleConfig,
    sink: Box<dyn FrameSink>,
}

impl Console {
    pub fn new(config: ConsoleConfig, sink: Box<dyn FrameSink>) -> Result<Self, RelayError> {
        let client = BrokerClient::new(
            &config.broker_url,
            Duration::from_secs(config.http_timeout_secs),
        )?;
        Ok(Self {
            client,
            config,
            sink,
        })
    }

    /// Top-level loop: pick a session, run it, return to the list.
    /// Returns when the operator quits from the session list.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let session = match self.pick_session(&mut lines).await? {
                Some(s) => s,
                None => return Ok(()),
            };
            self.connect(&session, &mut lines).await?;
        }
    }

    /// Show the session list until the operator picks one or quits.
    async fn pick_session(
        &self,
        lines: &mut Lines<BufReader<Stdin>>,
    ) -> anyhow::Result<Option<SessionSummary>> {
        loop {
            let sessions = match self.client.list_sessions().await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("session list failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(self.config.list_refresh_secs)).await;
                    continue;
                }
            };

            if sessions.is_empty() {
                println!("\nNo clients waiting.");
            } else {
                println!("\nClients waiting for assistance:");
                for (i, s) in sessions.iter().enumerate() {
                    println!(
                        "  {}. {} ({}) — registered {}",
                        i + 1,
                        s.client_name,
                        s.os,
                        s.created_at.format("%H:%M:%S")
                    );
                }
            }
            println!("Enter a number to connect, r to refresh, q to quit:");

            let line = match lines.next_line().await? {
                Some(l) => l,
                None => return Ok(None),
            };
            match line.trim() {
                "q" | "quit" => return Ok(None),
                "" | "r" => continue,
                n => match n.parse::<usize>() {
                    Ok(i) if i >= 1 && i <= sessions.len() => {
                        return Ok(Some(sessions[i - 1].clone()))
                    }
                    _ => println!("No such entry."),
                },
            }
        }
    }

    /// Request the connection, wait for the client's decision, and if
    /// approved run the session until either side ends it.
    async fn connect(
        &mut self,
        session: &SessionSummary,
        lines: &mut Lines<BufReader<Stdin>>,
    ) -> anyhow::Result<()> {
        match self
            .client
            .request_connection(&session.session_id, &self.config.technician_name)
            .await
        {
            Ok(()) => {}
            Err(RelayError::RequestPending) => {
                println!("That client is already being helped or has a pending request.");
                return Ok(());
            }
            Err(RelayError::NotFound) => {
                println!("That session is gone.");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        println!("Waiting for {} to approve...", session.client_name);
        let outcome = match self
            .client
            .wait_for_authorization(
                &session.session_id,
                Duration::from_millis(self.config.authorization_poll_ms),
                Duration::from_secs(self.config.authorization_timeout_secs),
            )
            .await
        {
            Ok(o) => o,
            Err(RelayError::NotFound) => {
                println!("That session is gone.");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        match outcome {
            AuthorizationOutcome::Authorized => {}
            AuthorizationOutcome::Denied => {
                println!("Access refused by the client.");
                return Ok(());
            }
            AuthorizationOutcome::Timeout => {
                println!("The client did not respond.");
                return Ok(());
            }
        }

        println!("Connected to {}. Type 'help' for commands.", session.client_name);
        let viewport = (self.config.viewport_width, self.config.viewport_height);
        let end = tokio::select! {
            e = render_loop(&self.client, &session.session_id, self.sink.as_mut(), &self.config) => e,
            e = operator_loop(&self.client, &session.session_id, lines, viewport) => e,
        };

        // clear our side regardless of how the session ended
        match self
            .client
            .disconnect(&session.session_id, Side::Technician)
            .await
        {
            Ok(()) | Err(RelayError::NotFound) => {}
            Err(e) => tracing::warn!("disconnect failed: {}", e),
        }

        match end {
            SessionEnd::PeerLeft => println!("Session ended by the client."),
            SessionEnd::OperatorQuit => println!("Session closed."),
        }
        Ok(())
    }
}

/// Poll for relayed payloads: write the newest frame to the sink,
/// print command results, stop when the session ends.
pub async fn render_loop(
    client: &BrokerClient,
    session_id: &str,
    sink: &mut dyn FrameSink,
    config: &ConsoleConfig,
) -> SessionEnd {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.render_poll_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let (messages, active) = match client
            .receive_messages(session_id, Side::Technician)
            .await
        {
            Ok(v) => v,
            Err(RelayError::NotFound) => return SessionEnd::PeerLeft,
            Err(e) => {
                tracing::warn!("render poll failed: {}", e);
                continue;
            }
        };

        for m in &messages {
            if let Some(Payload::Input(InputCommand::CommandResult {
                stdout,
                stderr,
                exit_code,
            })) = Payload::from_value(&m.message)
            {
                println!("--- remote command exited with {}", exit_code);
                if !stdout.is_empty() {
                    print!("{}", stdout);
                }
                if !stderr.is_empty() {
                    eprint!("{}", stderr);
                }
            }
        }

        if let Some(data) = newest_frame(&messages) {
            match decode_frame(&data) {
                Ok(bytes) => {
                    if let Err(e) = sink.write_frame(&bytes) {
                        tracing::warn!("frame write failed: {}", e);
                    }
                }
                Err(e) => tracing::warn!("frame decode failed: {}", e),
            }
        }

        if !active {
            return SessionEnd::PeerLeft;
        }
    }
}

/// Read operator commands and relay them until quit.
async fn operator_loop(
    client: &BrokerClient,
    session_id: &str,
    lines: &mut Lines<BufReader<Stdin>>,
    viewport: (u32, u32),
) -> SessionEnd {
    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) | Err(_) => return SessionEnd::OperatorQuit,
        };
        match parse_command(&line, viewport) {
            ParsedCommand::Quit => return SessionEnd::OperatorQuit,
            ParsedCommand::Help => println!("{}", HELP_TEXT),
            ParsedCommand::Empty => {}
            ParsedCommand::Invalid(msg) => println!("{}", msg),
            ParsedCommand::Input(command) => {
                let value = match serde_json::to_value(&command) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!("command serialize failed: {}", e);
                        continue;
                    }
                };
                match client.send_message(session_id, Side::Technician, value).await {
                    Ok(()) => {}
                    Err(RelayError::NotFound) => return SessionEnd::PeerLeft,
                    Err(e) => tracing::warn!("command send failed: {}", e),
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
