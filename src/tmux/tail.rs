use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use super::Multiplexer;

/// How many trailing lines of the previous capture count as already seen.
const SEEN_WINDOW: usize = 50;

/// Stream a session's output into `tx`, polling every `interval`.
///
/// The first capture is forwarded whole; after that only lines that were not
/// among the tail of the previous capture. Returns once a capture comes back
/// empty (the session is gone) or the receiver is dropped.
pub async fn tail_session<M: Multiplexer>(
    mux: &M,
    session: &str,
    lines: usize,
    interval: Duration,
    tx: mpsc::UnboundedSender<String>,
) {
    let mut last = match capture_lines(mux, session, lines).await {
        Some(output) => output,
        None => return,
    };

    for line in &last {
        if tx.send(line.clone()).is_err() {
            return;
        }
    }

    loop {
        tokio::time::sleep(interval).await;

        let current = match capture_lines(mux, session, lines).await {
            Some(output) => output,
            None => {
                debug!(session, "tail: no output, session closed");
                return;
            }
        };

        if current == last {
            continue;
        }

        let seen: HashSet<&String> = last[last.len().saturating_sub(SEEN_WINDOW)..]
            .iter()
            .collect();
        for line in current.iter().filter(|line| !seen.contains(line)) {
            if tx.send(line.clone()).is_err() {
                return;
            }
        }

        last = current;
    }
}

async fn capture_lines<M: Multiplexer>(mux: &M, session: &str, lines: usize) -> Option<Vec<String>> {
    let output = mux.capture(session, lines).await?;
    if output.is_empty() {
        return None;
    }
    Some(output.lines().map(str::to_string).collect())
}
