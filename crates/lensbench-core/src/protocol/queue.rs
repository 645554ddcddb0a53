//! Command queue and block-buffer flow control
//!
//! The controller accepts motion blocks into a fixed-size planner buffer and
//! silently drops what does not fit, so the host has to count. Every status
//! telegram carries the free slot count (`Bf:`); the [`FlowController`] turns
//! that count into dispatch credits and the [`CommandQueue`] hands out user
//! commands only while credits remain.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::commands::OutboundCommand;
use super::telegram::StatusSnapshot;

/// Dispatch credits derived from the last reported free block count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Credits {
    /// No `Bf:` report seen this session
    Unknown,
    Slots(u32),
    Unlimited,
}

/// Unanswered polls remembered before the oldest is forgotten
const MAX_POLLS_IN_FLIGHT: usize = 64;

/// Tracks how many gated commands may still be written.
///
/// A status reply describes the planner buffer as it was when the poll was
/// written, not when the reply is read. Every gated command dispatched after
/// that poll is therefore subtracted from the reported count.
#[derive(Debug, Clone)]
pub struct FlowController {
    credits: Credits,
    /// Gated commands dispatched this session
    dispatched: u64,
    /// Value of `dispatched` when each unanswered poll was written, oldest first
    polls: VecDeque<u64>,
}

impl Default for FlowController {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowController {
    /// Gate closed until the first status telegram reports free slots
    pub fn new() -> Self {
        Self {
            credits: Credits::Unknown,
            dispatched: 0,
            polls: VecDeque::new(),
        }
    }

    /// Gate permanently open
    pub fn unlimited() -> Self {
        Self {
            credits: Credits::Unlimited,
            ..Self::new()
        }
    }

    /// Record that a status poll was written to the controller
    pub fn poll_sent(&mut self) {
        if self.polls.len() == MAX_POLLS_IN_FLIGHT {
            self.polls.pop_front();
        }
        self.polls.push_back(self.dispatched);
    }

    /// Number of polls still waiting for their reply
    pub fn polls_in_flight(&self) -> usize {
        self.polls.len()
    }

    /// Take the free slot count from a status telegram.
    ///
    /// The telegram answers the oldest unanswered poll; commands dispatched
    /// since that poll are deducted. With no poll outstanding the count is
    /// taken as current. A telegram without `Bf:` still answers its poll but
    /// leaves the credits as they are.
    pub fn observe(&mut self, status: &StatusSnapshot) {
        let since = self.polls.pop_front().unwrap_or(self.dispatched);
        if let Some(blocks) = status.block_buffer_avail() {
            let in_flight = u32::try_from(self.dispatched - since).unwrap_or(u32::MAX);
            self.set_available(blocks.saturating_sub(in_flight));
        }
    }

    /// Overwrite the remaining credits
    pub fn set_available(&mut self, blocks: u32) {
        if self.credits != Credits::Unlimited {
            self.credits = Credits::Slots(blocks);
        }
    }

    /// Remaining credits; `None` when unknown or unlimited
    pub fn available(&self) -> Option<u32> {
        match self.credits {
            Credits::Slots(n) => Some(n),
            _ => None,
        }
    }

    /// Whether a gated command may be written now
    pub fn can_dispatch(&self) -> bool {
        match self.credits {
            Credits::Unknown => false,
            Credits::Slots(n) => n > 0,
            Credits::Unlimited => true,
        }
    }

    fn consume(&mut self) {
        self.dispatched += 1;
        if let Credits::Slots(n) = self.credits {
            self.credits = Credits::Slots(n.saturating_sub(1));
        }
    }

    /// Forget everything learned from the previous session
    pub fn reset(&mut self) {
        if self.credits != Credits::Unlimited {
            self.credits = Credits::Unknown;
        }
        self.dispatched = 0;
        self.polls.clear();
    }
}

/// FIFO of pending commands shared between producers and the worker.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<OutboundCommand>>>,
}

impl CommandQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<OutboundCommand>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append to the tail
    pub fn enqueue(&self, command: OutboundCommand) {
        self.lock().push_back(command);
    }

    /// Take the next command the flow controller allows.
    ///
    /// The head is returned when it bypasses the gate or a credit is
    /// available (consuming one). Otherwise the first gate-bypassing command
    /// further back is taken, so polls keep flowing while motion waits; gated
    /// commands never overtake one another.
    pub fn try_dequeue(&self, flow: &mut FlowController) -> Option<OutboundCommand> {
        let mut queue = self.lock();
        let head = queue.front()?;

        if head.tag().bypasses_buffer_gate() {
            return queue.pop_front();
        }
        if flow.can_dispatch() {
            flow.consume();
            return queue.pop_front();
        }

        let pos = queue.iter().position(|c| c.tag().bypasses_buffer_gate())?;
        queue.remove(pos)
    }

    /// Nothing waiting to be written
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of commands waiting
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Drop everything still pending; returns how many commands were dropped
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let n = queue.len();
        queue.clear();
        n
    }
}
