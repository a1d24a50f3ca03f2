//! Commands accepted on the message channel.

use serde_json::Value;

/// A recognised message command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
  /// Activate the waiting version right away (no store effect)
  SkipWaiting,
  /// Drop the dynamic partition
  ClearCache,
}

/// Action names and the command each one maps to
const ACTIONS: &[(&str, Command)] = &[
  ("skipWaiting", Command::SkipWaiting),
  ("clearCache", Command::ClearCache),
];

impl Command {
  /// Read the `action` field of a message payload.
  ///
  /// Payloads without a string `action`, or with an unknown one, yield `None`.
  pub fn from_message(message: &Value) -> Option<Self> {
    let action = message.get("action")?.as_str()?;
    ACTIONS
      .iter()
      .find(|(name, _)| *name == action)
      .map(|(_, cmd)| *cmd)
  }
}
