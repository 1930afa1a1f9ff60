//! Threshold interrupt delivery for the VCNL4010.
//!
//! The INT line of the sensor is open-drain and pulled low while any bit in
//! the interrupt status register is set. An [`InterruptListener`] task waits
//! for the falling edge, reads the status register, queues an
//! [`InterruptEvent`] and writes the status back to clear the line.
//!
//! The [`InterruptQueue`] holds at most one undelivered event. If a second
//! interrupt fires before the consumer has called `wait`, its status is still
//! cleared on the device but the event itself is dropped.
//!
//! ```text
//!  INT pin ──falling edge──▶ InterruptListener ──try_send──▶ InterruptQueue
//!                                  │                              │
//!                     read 0x8E / write 0x8E                Vcnl4010::wait
//! ```

use core::cell::Cell;
use core::fmt;

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::signal::Signal;
use embassy_time::Instant;
use embedded_hal_async::digital::Wait;
use embedded_hal_async::i2c::I2c;
use log::{debug, error, info, warn};

use super::interface::RegisterInterface;
use super::registers::{InterruptStatus, Register};

/// One undelivered event at a time.
const QUEUE_DEPTH: usize = 1;

/// BCM pin used when the configuration does not name one.
pub const DEFAULT_INTERRUPT_PIN: u8 = 24;

/// A threshold or data-ready interrupt as seen by the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptEvent {
    status: InterruptStatus,
    timestamp: Instant,
}

impl InterruptEvent {
    pub fn new(status: InterruptStatus, timestamp: Instant) -> Self {
        Self { status, timestamp }
    }

    pub fn status(&self) -> InterruptStatus {
        self.status
    }

    /// Raw contents of the status register when the interrupt was handled
    pub fn raw(&self) -> u8 {
        self.status.bits()
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

impl fmt::Display for InterruptEvent {
    /// The decimal status value, e.g. `"1"` for a high-threshold crossing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status.bits())
    }
}

/// How [`InterruptQueue::wait`] behaves when nothing is queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Suspend until an event arrives
    Blocking,
    /// Return `None` immediately
    NonBlocking,
}

/// What the listener did with one interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// Event queued and status cleared
    Queued(InterruptStatus),
    /// An event was already pending; status cleared, event dropped
    Coalesced(InterruptStatus),
    /// The status register could not be read or cleared
    BusFailure,
}

/// Single-slot event queue shared by the listener and the driver.
///
/// At most one listener is attached at a time. The attachment is held by a
/// [`ListenerClaim`] inside the listener and ends when the listener is dropped
/// or its `run` returns.
///
/// Usually placed in a `static`:
///
/// ```no_run
/// use sharktank_core::sensors::vcnl4010::InterruptQueue;
///
/// static VCNL_EVENTS: InterruptQueue = InterruptQueue::new();
/// ```
pub struct InterruptQueue {
    events: Channel<CriticalSectionRawMutex, InterruptEvent, QUEUE_DEPTH>,
    release: Signal<CriticalSectionRawMutex, ()>,
    claimed: BlockingMutex<CriticalSectionRawMutex, Cell<bool>>,
}

impl InterruptQueue {
    pub const fn new() -> Self {
        Self {
            events: Channel::new(),
            release: Signal::new(),
            claimed: BlockingMutex::new(Cell::new(false)),
        }
    }

    /// Queue an event unless one is already pending.
    ///
    /// The emptiness check and the push are one atomic `try_send`.
    pub fn offer(&self, event: InterruptEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
        }
    }

    /// Take the pending event, suspending first if `mode` is blocking.
    pub async fn wait(&self, mode: WaitMode) -> Option<InterruptEvent> {
        match mode {
            WaitMode::Blocking => Some(self.events.receive().await),
            WaitMode::NonBlocking => self.events.try_receive().ok(),
        }
    }

    /// Drop any pending event.
    pub fn drain(&self) {
        while self.events.try_receive().is_ok() {}
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Ask a running listener to stop and hand back its pin.
    pub(crate) fn request_release(&self) {
        self.release.signal(());
    }

    /// Whether a listener is still attached
    pub fn has_listener(&self) -> bool {
        self.claimed.lock(|claimed| claimed.get())
    }

    /// Attach a new listener.
    ///
    /// Fails while an earlier listener is alive, since a release request can
    /// only reach one of them. On success any pending event and any stale
    /// release request are discarded.
    pub(crate) fn claim(&self) -> Option<ListenerClaim<'_>> {
        let won = self.claimed.lock(|claimed| !claimed.replace(true));
        if !won {
            return None;
        }
        self.release.reset();
        self.drain();
        Some(ListenerClaim { queue: self })
    }
}

impl Default for InterruptQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that a listener is attached to an [`InterruptQueue`]. Detaches on drop.
pub struct ListenerClaim<'q> {
    queue: &'q InterruptQueue,
}

impl Drop for ListenerClaim<'_> {
    fn drop(&mut self) {
        self.queue.claimed.lock(|claimed| claimed.set(false));
    }
}

/// Producer half of the interrupt path.
///
/// Owns the interrupt pin and a register interface on its own bus device, so
/// it never touches the driver's state. Run [`InterruptListener::run`] as a
/// task. It hands back the pin and its bus device once the driver's
/// `exit_clean_up` is called.
pub struct InterruptListener<'q, P, I> {
    pin: P,
    pin_number: u8,
    regs: RegisterInterface<I>,
    queue: &'q InterruptQueue,
    _claim: ListenerClaim<'q>,
}

impl<'q, P, I> InterruptListener<'q, P, I>
where
    P: Wait,
    I: I2c,
{
    pub(crate) fn new(
        pin: P,
        pin_number: u8,
        regs: RegisterInterface<I>,
        claim: ListenerClaim<'q>,
    ) -> Self {
        Self {
            pin,
            pin_number,
            regs,
            queue: claim.queue,
            _claim: claim,
        }
    }

    pub fn pin_number(&self) -> u8 {
        self.pin_number
    }

    /// Service falling edges until the binding is released.
    ///
    /// Pin and bus failures are logged and the loop carries on. The queue is
    /// free for a new listener once this returns.
    pub async fn run(mut self) -> (P, I) {
        info!("VCNL4010 interrupt listener armed on pin {}", self.pin_number);

        loop {
            match select(self.pin.wait_for_falling_edge(), self.queue.release.wait()).await {
                Either::First(Ok(())) => {
                    self.handle_interrupt().await;
                }
                Either::First(Err(e)) => {
                    error!(
                        "Waiting for falling edge on pin {} failed: {:?}",
                        self.pin_number, e
                    );
                }
                Either::Second(()) => break,
            }
        }

        info!("VCNL4010 interrupt pin {} released", self.pin_number);
        (self.pin, self.regs.release())
    }

    /// Read, queue and clear one interrupt. Never returns an error.
    pub async fn handle_interrupt(&mut self) -> InterruptOutcome {
        let status = match self.regs.read_byte(Register::InterruptStatus).await {
            Ok(val) => InterruptStatus::from_register(val),
            Err(e) => {
                error!("Failed to read interrupt status: {}", e);
                return InterruptOutcome::BusFailure;
            }
        };

        let queued = self.queue.offer(InterruptEvent::new(status, Instant::now()));
        if queued {
            debug!("Queued VCNL4010 interrupt, status 0x{:02X}", status.bits());
        } else {
            warn!(
                "VCNL4010 interrupt 0x{:02X} dropped, previous event not consumed",
                status.bits()
            );
        }

        // Write-one-to-clear, whether or not the event was kept.
        if let Err(e) = self
            .regs
            .write_byte(Register::InterruptStatus, status.bits())
            .await
        {
            error!("Failed to clear interrupt status: {}", e);
            return InterruptOutcome::BusFailure;
        }

        if queued {
            InterruptOutcome::Queued(status)
        } else {
            InterruptOutcome::Coalesced(status)
        }
    }
}
