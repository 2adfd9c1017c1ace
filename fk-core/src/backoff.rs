use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::*;

use crate::errors::*;

// Bounded exponential retry ladder; the startup readiness probe runs under
// the default ladder (1s initial, factor 2, 10% jitter, five attempts), so a
// dead apiserver fails the process in about half a minute.
#[derive(Clone, Debug)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: f64,
    pub jitter: f64,
    pub attempts: u32,
}

impl Default for Backoff {
    fn default() -> Backoff {
        Backoff {
            initial: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.1,
            attempts: 5,
        }
    }
}

impl Backoff {
    pub async fn retry<T, F, Fut>(&self, desc: &str, mut f: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        ensure!(self.attempts > 0, "retry ladder must allow at least one attempt");

        let mut delay = self.initial;
        for attempt in 1..self.attempts {
            match f().await {
                Ok(val) => return Ok(val),
                Err(err) => {
                    warn!("{desc} failed (attempt {attempt}/{}): {err}", self.attempts);
                    sleep(jittered(delay, self.jitter)).await;
                    delay = delay.mul_f64(self.factor);
                },
            }
        }

        f().await
            .map_err(|err| err.context(format!("{desc} failed after {} attempts", self.attempts)))
    }
}

pub fn jittered(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let spread = rand::thread_rng().gen_range(-jitter..=jitter);
    delay.mul_f64(1.0 + spread)
}
