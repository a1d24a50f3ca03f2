use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Host events, one JSON object per input line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
  /// New version installed: populate the static partition
  Install,
  /// New version takes control: prune old partitions
  Activate,
  /// Intercepted request
  Fetch {
    url: String,
    #[serde(default = "default_method")]
    method: String,
  },
  /// Message from a page, e.g. `{"action": "clearCache"}`
  Message { data: Value },
}

fn default_method() -> String {
  "GET".to_string()
}

/// Event handler that produces events from a line-oriented reader
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Read events from stdin
  pub fn stdin() -> Self {
    Self::new(BufReader::new(tokio::io::stdin()))
  }

  pub fn new<R>(input: R) -> Self
  where
    R: AsyncBufRead + Unpin + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn input reader
    tokio::spawn(async move {
      let mut lines = input.lines();
      loop {
        match lines.next_line().await {
          Ok(Some(line)) => {
            let line = line.trim();
            if line.is_empty() {
              continue;
            }
            match serde_json::from_str::<Event>(line) {
              Ok(event) => {
                if tx.send(event).is_err() {
                  break;
                }
              }
              Err(e) => tracing::warn!("skipping malformed event {:?}: {}", line, e),
            }
          }
          Ok(None) => break,
          Err(e) => {
            tracing::error!("failed to read events: {}", e);
            break;
          }
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event; `None` once the input is exhausted
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[tokio::test]
  async fn test_reads_events_in_order() {
    let input: &'static [u8] = br#"{"type":"install"}

not json
{"type":"fetch","url":"/api/games"}
{"type":"fetch","url":"/api/games","method":"POST"}
{"type":"message","data":{"action":"clearCache"}}
{"type":"activate"}
"#;
    let mut events = EventHandler::new(input);

    let mut seen = Vec::new();
    while let Some(event) = events.next().await {
      seen.push(event);
    }

    assert_eq!(
      seen,
      vec![
        Event::Install,
        Event::Fetch {
          url: "/api/games".to_string(),
          method: "GET".to_string()
        },
        Event::Fetch {
          url: "/api/games".to_string(),
          method: "POST".to_string()
        },
        Event::Message {
          data: json!({"action": "clearCache"})
        },
        Event::Activate,
      ]
    );
  }

  #[test]
  fn test_unknown_event_type_is_rejected() {
    assert!(serde_json::from_str::<Event>(r#"{"type":"sync"}"#).is_err());
  }
}
