//! Line-oriented command driver.
//!
//! Each input line is a JSON command such as
//! `{"type":"create_rectangle","x":10,"y":10,"width":50,"height":30}`.
//! Each produces exactly one JSON response line on the output, in input order.

use anyhow::{Context, Result};
use editor_bridge::{CommandGateway, CommandRequest, ErrorBody, ErrorCode, ResponseEnvelope};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Error code for input lines that are not valid commands.
pub const INVALID_COMMAND: &str = "INVALID_COMMAND";

/// Run until the input closes. Returns the number of commands handled.
pub async fn run_command_driver<R, W>(
    gateway: CommandGateway,
    input: R,
    mut output: W,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await.context("failed to read command input")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match parse_command(line) {
            Ok(command) => {
                debug!(kind = command.kind(), "Forwarding command");
                gateway.send(command).await
            }
            Err(reason) => {
                warn!(error = %reason, "Rejecting input line");
                ResponseEnvelope::failure(
                    "invalid_command",
                    None,
                    ErrorBody::new(ErrorCode::from(INVALID_COMMAND.to_string()), reason),
                )
            }
        };

        let mut encoded =
            serde_json::to_string(&response).context("failed to encode response")?;
        encoded.push('\n');
        output
            .write_all(encoded.as_bytes())
            .await
            .context("failed to write response")?;
        output.flush().await.context("failed to flush response")?;
        handled += 1;
    }

    info!(commands = handled, "Command input closed");
    Ok(handled)
}

fn parse_command(line: &str) -> Result<CommandRequest, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| format!("invalid JSON: {}", e))?;
    CommandRequest::from_value(value).map_err(|e| e.to_string())
}
