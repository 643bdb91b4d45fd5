//! Cooperative, priority-ordered service scheduler.
//!
//! The application drives one [`Scheduler`] that rotates through a fixed,
//! priority-ordered set of services (AMS=253, a PMF=252, the FIFO-group
//! coordinator=250, ...). Each service is a pure "read my event bits, do
//! bounded work, clear the bits I serviced" routine — see
//! [`crate::events::EventBits`]. There is no blocking, no mutex, no lock at
//! this level: the only "concurrent" actor is the LLD, which may call back
//! into [`crate::channel::PortMessageChannel`] from a foreign context, but
//! the contract is that those callbacks only set event bits and hand off
//! buffers; they never re-enter a service synchronously.

use heapless::Vec;
use log::trace;

/// One schedulable unit of work. Implementors service only the event bits
/// relevant to them and return promptly — no suspension points exist in
/// this model (`spec.md` §5).
pub trait Service {
    /// Higher runs first when multiple services have pending work in the
    /// same `tick()` pass. AMS=253, PMF=252, the remote sync manager
    /// touch-point=250 are the values this stack schedules at.
    fn priority(&self) -> u8;

    /// Human-readable name, used only for tracing.
    fn name(&self) -> &'static str;

    /// Perform one bounded unit of work. Must not block.
    fn service(&mut self);
}

/// Maximum number of services one scheduler instance can hold.
pub const MAX_SERVICES: usize = 8;

/// Rotates through its registered services in priority order on every
/// `tick()`. Registration order does not matter; priority does.
pub struct Scheduler<'a> {
    services: Vec<&'a mut dyn Service, MAX_SERVICES>,
}

impl<'a> Scheduler<'a> {
    /// An empty scheduler.
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
        }
    }

    /// Register a service, re-sorting the rotation by descending priority.
    /// Returns `Err(service)` if the scheduler is full.
    pub fn register(&mut self, service: &'a mut dyn Service) -> Result<(), &'a mut dyn Service> {
        self.services.push(service)?;
        self.services.sort_unstable_by(|a, b| b.priority().cmp(&a.priority()));
        Ok(())
    }

    /// Run one pass: call `service()` on every registered service, highest
    /// priority first. A single pass never blocks; callers loop this from
    /// their own idle/poll point.
    pub fn tick(&mut self) {
        for svc in self.services.iter_mut() {
            trace!("scheduler: servicing {}", svc.name());
            svc.service();
        }
    }

    /// Number of currently registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True if no services are registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Default for Scheduler<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduling priorities used by this stack's built-in services.
pub mod priority {
    /// Application Message Service.
    pub const AMS: u8 = 253;
    /// Each Port Message FIFO (ICM/MCM/RCM) runs at this priority.
    pub const PMF: u8 = 252;
    /// Remote Sync Manager touch-point (sync-lost signalling consumer).
    pub const RSM: u8 = 250;
}
