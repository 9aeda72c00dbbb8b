//! PWM dispatch queue.
//!
//! Serializes every physical bus write onto one worker thread while any
//! number of producers stage channel updates without waiting on the bus.
//!
//! Each channel has one pending slot. Staging a value overwrites whatever
//! the worker has not consumed yet, so a burst of updates to one channel
//! collapses into its last value. On each wake the worker takes every
//! staged slot at once and writes them in channel order, outside the lock.
//!
//! ```text
//!  producers ──set(ch, on, off)──▶ [slot 0][slot 1]…[slot N-1] ──drain──▶ worker ──▶ bus
//! ```

use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use parking_lot::{Condvar, Mutex};

use crate::utils::{
    controllers::pwm::PwmBus,
    error::ConfigError,
    retry::{retry, RetryPolicy},
};

/// On/off tick pair for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub on: u16,
    pub off: u16,
}

/// Latest-wins pending value per channel.
#[derive(Debug)]
struct PendingSlots {
    slots: Box<[Option<Pulse>]>,
}

impl PendingSlots {
    fn new(channels: usize) -> Self {
        Self {
            slots: vec![None; channels].into_boxed_slice(),
        }
    }

    /// Stage `pulse` for `channel`. Returns true if an unconsumed value was replaced.
    fn stage(
        &mut self,
        channel: u8,
        pulse: Pulse,
    ) -> bool {
        self.slots[channel as usize].replace(pulse).is_some()
    }

    /// Take every staged value, in channel order.
    fn drain(&mut self) -> Vec<(u8, Pulse)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.take().map(|p| (i as u8, p)))
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

#[derive(Debug)]
struct QueueState {
    pending: PendingSlots,
    stopped: bool,
}

/// Counters kept by the worker, readable at any time.
#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    coalesced: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of the dispatch counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    /// Values that reached the bus.
    pub written: u64,
    /// Values overwritten before the worker consumed them.
    pub coalesced: u64,
    /// Values given up on after every retry failed.
    pub dropped: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
    wake: Condvar,
    counters: Counters,
}

impl Shared {
    fn stats(&self) -> DispatchStats {
        DispatchStats {
            written: self.counters.written.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Producer handle. Cheap to clone; every clone feeds the same worker.
#[derive(Debug, Clone)]
pub struct PwmSender {
    shared: Arc<Shared>,
}

impl PwmSender {
    /// Stage a value for `channel`, replacing any value still pending for it.
    ///
    /// Never blocks on the bus and never fails. Staging after the queue was
    /// stopped, or on a channel the queue does not have, is a caller bug:
    /// it asserts in debug builds and is logged and ignored otherwise.
    pub fn set(
        &self,
        channel: u8,
        on: u16,
        off: u16,
    ) {
        let mut state = self.shared.state.lock();
        debug_assert!(!state.stopped, "PwmSender::set on stopped dispatch queue");
        if state.stopped {
            tracing::error!(channel, "set after dispatch queue stopped, ignored");
            return;
        }
        let known = (channel as usize) < state.pending.len();
        debug_assert!(known, "PwmSender::set on unknown channel {}", channel);
        if !known {
            tracing::error!(channel, "set on unknown channel, ignored");
            return;
        }
        if state.pending.stage(channel, Pulse { on, off }) {
            self.shared.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(channel, on, off, "pending value replaced");
        }
        drop(state);
        self.shared.wake.notify_one();
    }

    pub fn stats(&self) -> DispatchStats {
        self.shared.stats()
    }
}

impl PwmBus for PwmSender {
    type Error = Infallible;

    fn set_pulse(
        &mut self,
        channel: u8,
        on: u16,
        off: u16,
    ) -> Result<(), Self::Error> {
        self.set(channel, on, off);
        Ok(())
    }
}

/// Owns the worker thread and, through it, the bus.
pub struct PwmDispatchQueue<B>
where
    B: PwmBus + Send + 'static,
{
    shared: Arc<Shared>,
    worker: Option<JoinHandle<B>>,
}

impl<B> PwmDispatchQueue<B>
where
    B: PwmBus + Send + 'static,
{
    /// Spawn the worker over `bus` with one slot per channel.
    pub fn start(
        bus: B,
        channels: usize,
        policy: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        policy.validate()?;
        if channels == 0 || channels > u8::MAX as usize + 1 {
            return Err(ConfigError::ChannelCount(channels));
        }
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                pending: PendingSlots::new(channels),
                stopped: false,
            }),
            wake: Condvar::new(),
            counters: Counters::default(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("pwm-dispatch".into())
            .spawn(move || run_worker(worker_shared, bus, policy))?;

        tracing::info!(channels, attempts = policy.attempts, "PWM dispatch queue started");
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub fn sender(&self) -> PwmSender {
        PwmSender {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.shared.stats()
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Values still staged are written before the worker returns. Hands the
    /// bus back, or `None` if the worker panicked.
    pub fn stop(mut self) -> Option<B> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<B> {
        let worker = self.worker.take()?;
        {
            let mut state = self.shared.state.lock();
            state.stopped = true;
            self.shared.wake.notify_all();
        }
        match worker.join() {
            Ok(bus) => {
                tracing::info!(stats = ?self.shared.stats(), "PWM dispatch queue stopped");
                Some(bus)
            }
            Err(_) => {
                tracing::error!("PWM dispatch worker panicked");
                None
            }
        }
    }
}

impl<B> Drop for PwmDispatchQueue<B>
where
    B: PwmBus + Send + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<B: PwmBus>(
    shared: Arc<Shared>,
    mut bus: B,
    policy: RetryPolicy,
) -> B {
    tracing::debug!("PWM dispatch worker running");
    loop {
        let (batch, stopping) = {
            let mut state = shared.state.lock();
            while state.pending.is_empty() && !state.stopped {
                shared.wake.wait(&mut state);
            }
            (state.pending.drain(), state.stopped)
        };

        for (channel, pulse) in batch {
            tracing::trace!(channel, on = pulse.on, off = pulse.off, "bus write");
            let written = retry(policy, "pwm dispatch", || {
                bus.set_pulse(channel, pulse.on, pulse.off)
            });
            let counter = match written {
                Some(()) => &shared.counters.written,
                None => &shared.counters.dropped,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }

        if stopping {
            break;
        }
    }
    bus
}
