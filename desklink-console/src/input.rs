//! Operator command line.
//!
//! The console drives the remote machine through typed commands.
//! Coordinates are given in the local viewport and translated to the
//! canonical space before they go on the wire, so the agent's scaling
//! is independent of how the console displays frames.

use desklink_core::protocol::{InputCommand, MouseButton, CANONICAL_HEIGHT, CANONICAL_WIDTH};

/// One parsed operator line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCommand {
    Input(InputCommand),
    Quit,
    Help,
    Empty,
    Invalid(String),
}

pub const HELP_TEXT: &str = "\
commands:
  move <x> <y>          move the remote cursor
  click <x> <y> [right] click at the given position
  type <text>           type text on the remote machine
  exec <command>        run a shell command remotely
  help                  show this help
  quit                  end the session";

/// Parse an operator line. `viewport` is the local display size the
/// coordinates refer to.
pub fn parse_command(line: &str, viewport: (u32, u32)) -> ParsedCommand {
    let line = line.trim();
    if line.is_empty() {
        return ParsedCommand::Empty;
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((v, r)) => (v, r.trim()),
        None => (line, ""),
    };

    match verb {
        "quit" | "exit" | "q" => ParsedCommand::Quit,
        "help" | "?" => ParsedCommand::Help,
        "move" => match parse_point(rest, viewport) {
            Some(((x, y), "")) => ParsedCommand::Input(InputCommand::MouseMove { x, y }),
            _ => ParsedCommand::Invalid("usage: move <x> <y>".to_string()),
        },
        "click" => match parse_point(rest, viewport) {
            Some(((x, y), "")) => ParsedCommand::Input(InputCommand::MouseClick {
                x,
                y,
                button: MouseButton::Left,
            }),
            Some(((x, y), "right")) => ParsedCommand::Input(InputCommand::MouseClick {
                x,
                y,
                button: MouseButton::Right,
            }),
            _ => ParsedCommand::Invalid("usage: click <x> <y> [right]".to_string()),
        },
        "type" => {
            if rest.is_empty() {
                ParsedCommand::Invalid("usage: type <text>".to_string())
            } else {
                ParsedCommand::Input(InputCommand::KeyboardInput {
                    text: rest.to_string(),
                })
            }
        }
        "exec" | "run" => {
            if rest.is_empty() {
                ParsedCommand::Invalid("usage: exec <command>".to_string())
            } else {
                ParsedCommand::Input(InputCommand::ExecuteCommand {
                    command: rest.to_string(),
                })
            }
        }
        other => ParsedCommand::Invalid(format!("unknown command: {}", other)),
    }
}

/// Parse two leading coordinates, translate viewport → canonical, and
/// return the remainder of the line.
fn parse_point<'a>(rest: &'a str, viewport: (u32, u32)) -> Option<((f64, f64), &'a str)> {
    let mut parts = rest.splitn(3, char::is_whitespace);
    let x: f64 = parts.next()?.parse().ok()?;
    let y: f64 = parts.next()?.parse().ok()?;
    let tail = parts.next().unwrap_or("").trim();

    let (vw, vh) = viewport;
    if vw == 0 || vh == 0 {
        return None;
    }
    let cx = x / vw as f64 * CANONICAL_WIDTH as f64;
    let cy = y / vh as f64 * CANONICAL_HEIGHT as f64;
    Some(((cx, cy), tail))
}

// ============================================================================
// TESTS
// ============================================================================
