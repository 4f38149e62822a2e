//! Heartbeat liveness probe and latency sampler.
//!
//! While connected (and visible), the driver sends a correlated `ping`
//! envelope every `heartbeatIntervalMs` and the waiter spawned here measures
//! the round trip on the `pong`. A timed-out probe is logged and nothing
//! more: distinguishing a slow server from a dead transport is left to the
//! transport's own close event, so probe failures never force a reconnect.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use tether_core::envelope::now_millis;
use tether_core::ClientError;

use crate::client::SharedState;
use crate::correlator::ReplySender;

/// Build the driver's heartbeat ticker.
///
/// The first tick fires one full period after (re)connection, not
/// immediately, and missed ticks (e.g. while suspended) are skipped rather
/// than replayed in a burst.
#[must_use]
pub fn heartbeat_interval(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Outcome channel for one probe, paired with the reply sender the
/// correlator parks.
#[must_use]
pub fn probe_channel() -> (ReplySender, oneshot::Receiver<Result<serde_json::Value, ClientError>>)
{
    let (tx, rx) = oneshot::channel();
    (tx, rx)
}

/// Await one probe's pong and record the round trip.
///
/// `reply` forwards the measured latency to an explicit `ping()` caller, if
/// one is waiting.
pub fn spawn_probe(
    rx: oneshot::Receiver<Result<serde_json::Value, ClientError>>,
    shared: SharedState,
    reply: Option<oneshot::Sender<Result<u64, ClientError>>>,
) {
    let sent_at = Instant::now();
    drop(tokio::spawn(async move {
        let outcome = match rx.await {
            Ok(Ok(_payload)) => {
                #[allow(clippy::cast_possible_truncation)]
                let latency_ms = sent_at.elapsed().as_millis() as u64;
                shared
                    .stats
                    .write()
                    .record_heartbeat(now_millis(), latency_ms);
                debug!(latency_ms, "heartbeat pong");
                Ok(latency_ms)
            }
            Ok(Err(err)) => {
                // Logged only; the transport close event decides liveness.
                warn!(error = %err, "heartbeat probe failed");
                Err(err)
            }
            Err(_) => Err(ClientError::ConnectionClosed),
        };
        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }));
}
