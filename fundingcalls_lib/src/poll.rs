//! Bounded polling combinators for the portal's lazily rendered UI.
//!
//! The dropdowns render options only as they scroll into view, and result
//! pages swap their cards asynchronously. Both are handled by sampling a
//! probe, acting, waiting and sampling again, always with a hard bound.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};

/// Scroll step, pause and attempt bound for virtualized lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollPolicy {
    pub step_px: i64,
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            step_px: 200,
            interval_ms: 500,
            max_attempts: 10,
        }
    }
}

impl ScrollPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Outcome of [`stabilize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stabilized {
    /// Last sampled size.
    pub count: usize,
    /// Number of act/wait cycles performed.
    pub attempts: u32,
    /// False when the attempt bound was hit while the list was still growing.
    pub converged: bool,
}

/// Grow a lazily rendered collection until it stops growing.
///
/// Samples the size, then repeatedly acts (scrolls), waits and resamples.
/// Stops as soon as one cycle adds nothing, or after `max_attempts` cycles.
pub async fn stabilize<E, S, SF, A, AF>(
    policy: &ScrollPolicy,
    mut sample: S,
    mut act: A,
) -> Result<Stabilized, E>
where
    S: FnMut() -> SF,
    SF: Future<Output = Result<usize, E>>,
    A: FnMut() -> AF,
    AF: Future<Output = Result<(), E>>,
{
    let mut previous = sample().await?;
    let mut attempts = 0;
    while attempts < policy.max_attempts {
        act().await?;
        sleep(policy.interval()).await;
        attempts += 1;
        let current = sample().await?;
        if current <= previous {
            return Ok(Stabilized {
                count: previous,
                attempts,
                converged: true,
            });
        }
        previous = current;
    }
    Ok(Stabilized {
        count: previous,
        attempts,
        converged: false,
    })
}

/// Probe, and between misses run `between` (typically a scroll) and wait,
/// up to `max_attempts` times. Returns the first hit, or `None`.
pub async fn poll_until<T, E, P, PF, B, BF>(
    policy: &ScrollPolicy,
    mut probe: P,
    mut between: B,
) -> Result<Option<T>, E>
where
    P: FnMut() -> PF,
    PF: Future<Output = Result<Option<T>, E>>,
    B: FnMut() -> BF,
    BF: Future<Output = Result<(), E>>,
{
    if let Some(hit) = probe().await? {
        return Ok(Some(hit));
    }
    for _ in 0..policy.max_attempts {
        between().await?;
        sleep(policy.interval()).await;
        if let Some(hit) = probe().await? {
            return Ok(Some(hit));
        }
    }
    Ok(None)
}

/// Re-run `probe` every `poll` until it returns true or `timeout` passes.
/// Returns whether the condition was met.
pub async fn wait_until<E, P, PF>(timeout: Duration, poll: Duration, mut probe: P) -> Result<bool, E>
where
    P: FnMut() -> PF,
    PF: Future<Output = Result<bool, E>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if probe().await? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(poll).await;
    }
}
