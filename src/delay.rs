use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Per-request deadline injected by the deadline stage
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Instant::now() + timeout,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// The deadline fired before the simulated delay finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded {
    pub elapsed: Duration,
}

/// Suspend the current task for `delay` and return the wall time actually
/// spent. Other requests keep running while this one sleeps.
///
/// With a deadline the sleep is abandoned once the deadline passes.
pub async fn hold(delay: Duration, deadline: Option<Deadline>) -> Result<Duration, DeadlineExceeded> {
    let start = Instant::now();
    match deadline {
        Some(deadline) => {
            if tokio::time::timeout_at(deadline.expires_at, tokio::time::sleep(delay))
                .await
                .is_err()
            {
                let elapsed = start.elapsed();
                debug!("Delay of {:?} cut short by deadline after {:?}", delay, elapsed);
                return Err(DeadlineExceeded { elapsed });
            }
        }
        None => tokio::time::sleep(delay).await,
    }
    Ok(start.elapsed())
}
