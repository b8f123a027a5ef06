//! Input injection on the client machine.
//!
//! Commands arrive with coordinates in the canonical 800×600 space and
//! are scaled to the real screen before injection. The `InputBackend`
//! trait hides the platform layer; `NullInput` (the headless default)
//! logs what would have happened instead.

use desklink_core::protocol::{InputCommand, MouseButton, CANONICAL_HEIGHT, CANONICAL_WIDTH};

/// Platform seam for mouse and keyboard injection.
pub trait InputBackend: Send {
    /// Actual screen resolution commands are scaled to.
    fn screen_size(&self) -> (u32, u32);
    fn mouse_move(&mut self, x: i32, y: i32) -> anyhow::Result<()>;
    fn mouse_click(&mut self, x: i32, y: i32, button: MouseButton) -> anyhow::Result<()>;
    fn keyboard_input(&mut self, text: &str) -> anyhow::Result<()>;
}

/// No-op backend: logs every event. Used headless and in tests.
pub struct NullInput {
    size: (u32, u32),
    pub last_event: Option<String>,
}

impl NullInput {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            last_event: None,
        }
    }
}

impl Default for NullInput {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

impl InputBackend for NullInput {
    fn screen_size(&self) -> (u32, u32) {
        self.size
    }

    fn mouse_move(&mut self, x: i32, y: i32) -> anyhow::Result<()> {
        tracing::debug!("input (noop): mouse_move to ({}, {})", x, y);
        self.last_event = Some(format!("move:{},{}", x, y));
        Ok(())
    }

    fn mouse_click(&mut self, x: i32, y: i32, button: MouseButton) -> anyhow::Result<()> {
        tracing::debug!("input (noop): {:?} click at ({}, {})", button, x, y);
        self.last_event = Some(format!("click:{},{}:{:?}", x, y, button));
        Ok(())
    }

    fn keyboard_input(&mut self, text: &str) -> anyhow::Result<()> {
        tracing::debug!("input (noop): type {:?}", text);
        self.last_event = Some(format!("type:{}", text));
        Ok(())
    }
}

/// Scale a canonical-space coordinate to the actual screen.
pub fn scale_coords(x: f64, y: f64, screen_width: u32, screen_height: u32) -> (i32, i32) {
    let sx = x / CANONICAL_WIDTH as f64 * screen_width as f64;
    let sy = y / CANONICAL_HEIGHT as f64 * screen_height as f64;
    (sx.round() as i32, sy.round() as i32)
}

/// Apply one relayed command. Returns a payload to send back to the
/// technician (only `ExecuteCommand` produces one).
pub async fn apply_command(
    backend: &mut dyn InputBackend,
    command: InputCommand,
) -> anyhow::Result<Option<InputCommand>> {
    let (screen_w, screen_h) = backend.screen_size();
    match command {
        InputCommand::MouseMove { x, y } => {
            let (sx, sy) = scale_coords(x, y, screen_w, screen_h);
            backend.mouse_move(sx, sy)?;
            Ok(None)
        }
        InputCommand::MouseClick { x, y, button } => {
            let (sx, sy) = scale_coords(x, y, screen_w, screen_h);
            backend.mouse_click(sx, sy, button)?;
            Ok(None)
        }
        InputCommand::KeyboardInput { text } => {
            backend.keyboard_input(&text)?;
            Ok(None)
        }
        InputCommand::ExecuteCommand { command } => {
            tracing::info!("executing remote command: {}", command);
            let result = run_shell_command(&command).await;
            Ok(Some(result))
        }
        // results only travel client → technician; ignore if echoed back
        InputCommand::CommandResult { .. } => Ok(None),
    }
}

/// Run a shell command and package its output. Failure to spawn is a
/// result too, never an error up the session loop.
async fn run_shell_command(command: &str) -> InputCommand {
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await;

    match output {
        Ok(out) => InputCommand::CommandResult {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => InputCommand::CommandResult {
            stdout: String::new(),
            stderr: format!("failed to spawn: {}", e),
            exit_code: -1,
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // TEST 1: canonical center maps to screen center
    // ========================================================================
    #[test]
    fn test_scale_coords_center() {
        assert_eq!(scale_coords(400.0, 300.0, 1920, 1080), (960, 540));
        assert_eq!(scale_coords(0.0, 0.0, 1920, 1080), (0, 0));
        assert_eq!(scale_coords(800.0, 600.0, 1920, 1080), (1920, 1080));
    }

    // ========================================================================
    // TEST 2: identity when the screen is already canonical-sized
    // ========================================================================
    #[test]
    fn test_scale_coords_identity() {
        assert_eq!(scale_coords(123.0, 456.0, 800, 600), (123, 456));
    }

    // ========================================================================
    // TEST 3: mouse commands reach the backend scaled
    // ========================================================================
    #[tokio::test]
    async fn test_apply_mouse_commands() {
        let mut backend = NullInput::new(1600, 1200);

        let reply = apply_command(&mut backend, InputCommand::MouseMove { x: 400.0, y: 300.0 })
            .await
            .unwrap();
        assert!(reply.is_none());
        assert_eq!(backend.last_event.as_deref(), Some("move:800,600"));

        apply_command(
            &mut backend,
            InputCommand::MouseClick {
                x: 0.0,
                y: 0.0,
                button: MouseButton::Right,
            },
        )
        .await
        .unwrap();
        assert_eq!(backend.last_event.as_deref(), Some("click:0,0:Right"));
    }

    // ========================================================================
    // TEST 4: keyboard text passes through unscaled
    // ========================================================================
    #[tokio::test]
    async fn test_apply_keyboard_input() {
        let mut backend = NullInput::default();
        apply_command(
            &mut backend,
            InputCommand::KeyboardInput {
                text: "hello".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(backend.last_event.as_deref(), Some("type:hello"));
    }

    // ========================================================================
    // TEST 5: execute_command returns stdout and exit code
    // ========================================================================
    #[tokio::test]
    async fn test_execute_command_returns_result() {
        let mut backend = NullInput::default();
        let reply = apply_command(
            &mut backend,
            InputCommand::ExecuteCommand {
                command: "echo hi".to_string(),
            },
        )
        .await
        .unwrap();

        match reply {
            Some(InputCommand::CommandResult {
                stdout, exit_code, ..
            }) => {
                assert_eq!(stdout.trim(), "hi");
                assert_eq!(exit_code, 0);
            }
            other => panic!("expected command result, got {:?}", other),
        }
    }

    // ========================================================================
    // TEST 6: failing commands report a nonzero exit, not an error
    // ========================================================================
    #[tokio::test]
    async fn test_execute_command_failure_is_a_result() {
        let mut backend = NullInput::default();
        let reply = apply_command(
            &mut backend,
            InputCommand::ExecuteCommand {
                command: "exit 3".to_string(),
            },
        )
        .await
        .unwrap();

        match reply {
            Some(InputCommand::CommandResult { exit_code, .. }) => assert_eq!(exit_code, 3),
            other => panic!("expected command result, got {:?}", other),
        }
    }
}
