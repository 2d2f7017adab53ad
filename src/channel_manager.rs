//! Channel-number allocation and the registry of live channels.
//!
//! The manager maps channel numbers to channel state under one mutex. A
//! channel's entry is removed when it closes; removal checks identity so a
//! late release never evicts a newer channel that reused the number.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::Instant;

mod allocator;

use allocator::NumberAllocator;

use crate::{
    channel::{Channel, ChannelInner, Lifecycle},
    connection::ConnectionCore,
    error::{Error, Result, ShutdownSignal},
    panic::lock,
    work_pool::WorkPool,
};

struct Registry {
    channels: HashMap<u16, Arc<ChannelInner>>,
    allocator: NumberAllocator,
}

/// Owns every user channel of a connection.
pub(crate) struct ChannelManager {
    registry: Mutex<Registry>,
}

impl ChannelManager {
    pub(crate) fn new(channel_max: u16) -> Self {
        Self {
            registry: Mutex::new(Registry {
                channels: HashMap::new(),
                allocator: NumberAllocator::new(channel_max),
            }),
        }
    }

    /// Apply the negotiated channel-max; done once, before any channel opens.
    pub(crate) fn set_channel_max(&self, channel_max: u16) {
        lock(&self.registry).allocator = NumberAllocator::new(channel_max);
    }

    /// Highest channel number that may be allocated.
    pub(crate) fn channel_max(&self) -> u16 { lock(&self.registry).allocator.max() }

    /// Allocate a channel number and register fresh state for it.
    ///
    /// With `number` set that exact number is reserved; otherwise the lowest
    /// free number is used.
    pub(crate) fn create(&self, number: Option<u16>, work: &WorkPool) -> Result<Arc<ChannelInner>> {
        let mut registry = lock(&self.registry);
        let number = match number {
            Some(number) if registry.allocator.reserve(number) => number,
            Some(number) => return Err(Error::ChannelNumberInUse(number)),
            None => registry
                .allocator
                .allocate()
                .ok_or(Error::NoChannelsAvailable)?,
        };
        let inner = Arc::new(ChannelInner::new(
            number,
            Lifecycle::Opening,
            work.register(number),
        ));
        registry.channels.insert(number, inner.clone());
        Ok(inner)
    }

    /// The channel registered under `number`, if any.
    pub(crate) fn get(&self, number: u16) -> Option<Arc<ChannelInner>> {
        lock(&self.registry).channels.get(&number).cloned()
    }

    pub(crate) fn open_count(&self) -> usize { lock(&self.registry).channels.len() }

    /// Remove `inner` and free its number, unless the number now belongs to
    /// another channel. Releasing twice is harmless.
    pub(crate) fn release(&self, inner: &Arc<ChannelInner>) {
        let mut registry = lock(&self.registry);
        let number = inner.number();
        match registry.channels.remove(&number) {
            Some(current) if !Arc::ptr_eq(&current, inner) => {
                registry.channels.insert(number, current);
            }
            Some(_) => registry.allocator.free(number),
            None => {}
        }
    }

    /// Shut every channel down with `signal`, then stop the work pool once
    /// each channel's final callbacks have run or `grace` has elapsed.
    pub(crate) fn handle_signal(&self, core: &Arc<ConnectionCore>, signal: &ShutdownSignal, grace: Duration) {
        let channels: Vec<_> = {
            let registry = lock(&self.registry);
            let mut channels: Vec<_> = registry.channels.values().cloned().collect();
            channels.sort_by_key(|inner| inner.number());
            channels
        };
        let mut latches = Vec::with_capacity(channels.len() + 1);
        for inner in channels {
            let channel = Channel::new(core.clone(), inner.clone());
            channel.release();
            channel.process_shutdown(signal, Lifecycle::Closed);
            latches.push(inner.queue.drained());
        }
        let channel0 = Channel::new(core.clone(), core.channel0.clone());
        channel0.process_shutdown(signal, Lifecycle::Closed);
        latches.push(core.channel0.queue.drained());

        let work = core.work.clone();
        tokio::spawn(async move {
            let deadline = Instant::now() + grace;
            for latch in latches {
                if tokio::time::timeout_at(deadline, latch.cancelled())
                    .await
                    .is_err()
                {
                    tracing::warn!("consumer work did not drain within the shutdown grace period");
                    break;
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !work.shutdown(remaining).await {
                tracing::warn!("consumer work pool stopped with callbacks still running");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn work() -> WorkPool { WorkPool::new(1) }

    #[rstest]
    fn create_picks_lowest_free(work: WorkPool) {
        let manager = ChannelManager::new(3);
        let first = manager.create(None, &work).expect("first");
        let second = manager.create(None, &work).expect("second");
        assert_eq!((first.number(), second.number()), (1, 2));
        manager.release(&first);
        assert_eq!(manager.create(None, &work).expect("reuse").number(), 1);
    }

    #[rstest]
    fn explicit_number_must_be_free(work: WorkPool) {
        let manager = ChannelManager::new(0);
        manager.create(Some(9), &work).expect("reserve");
        assert!(matches!(
            manager.create(Some(9), &work),
            Err(Error::ChannelNumberInUse(9))
        ));
        assert!(matches!(
            manager.create(Some(0), &work),
            Err(Error::ChannelNumberInUse(0))
        ));
    }

    #[rstest]
    fn exhaustion_is_reported(work: WorkPool) {
        let manager = ChannelManager::new(1);
        manager.create(None, &work).expect("only");
        assert!(matches!(
            manager.create(None, &work),
            Err(Error::NoChannelsAvailable)
        ));
    }

    #[rstest]
    fn stale_release_keeps_the_new_channel(work: WorkPool) {
        let manager = ChannelManager::new(4);
        let old = manager.create(Some(2), &work).expect("old");
        manager.release(&old);
        let new = manager.create(Some(2), &work).expect("new");
        manager.release(&old);
        let current = manager.get(2).expect("still mapped");
        assert!(Arc::ptr_eq(&current, &new));
        assert!(matches!(
            manager.create(Some(2), &work),
            Err(Error::ChannelNumberInUse(2))
        ));
        manager.release(&new);
        manager.release(&new);
        assert_eq!(manager.open_count(), 0);
    }
}
