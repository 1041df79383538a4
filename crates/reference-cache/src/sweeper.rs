//! Background eviction task.

use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::ReferenceCache;

impl<H: Send + Sync + 'static> ReferenceCache<H> {
    /// Run [`evict`](Self::evict) on the configured interval, and whenever a
    /// `put` pushes the cache over capacity.
    ///
    /// The task holds only a weak reference and stops once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.config().sweep_interval;

        info!(interval_secs = period.as_secs(), "Starting reference cache sweeper");

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                // only the weak handle is held while waiting
                let pressure = {
                    let Some(strong) = cache.upgrade() else {
                        break;
                    };
                    Arc::clone(&strong.pressure)
                };
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = pressure.notified() => {
                        debug!("Reference cache over capacity, sweeping early");
                    }
                }
                match cache.upgrade() {
                    Some(strong) => {
                        strong.evict();
                    }
                    None => break,
                }
            }

            debug!("Reference cache sweeper stopped");
        })
    }
}
