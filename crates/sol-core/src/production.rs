//! Construction and production lifecycle shared by buildings and cores.
//!
//! Two independent state machines live here:
//!
//! - [`Construction`]: an incomplete structure accumulates progress in
//!   `[0, 1]`. Progress never decreases and the `complete` flag flips from
//!   false to true exactly once.
//! - [`ProductionQueue`]: a completed production-capable structure holds a
//!   FIFO of items, exactly one of which is current. Progress advances only
//!   while the structure is powered. Finishing an item reports it to the
//!   caller; the queue never touches other entities.

use crate::entity::HeroKind;
use crate::fixed::{Fixed64, checked_div_64};
use crate::player::UpgradeKind;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Something a core or foundry can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductionItem {
    Worker,
    Soldier,
    Hero(HeroKind),
    Mirror,
    Upgrade(UpgradeKind),
}

impl ProductionItem {
    /// Stable numeric tag for state hashing.
    pub fn tag(self) -> u32 {
        match self {
            ProductionItem::Worker => 0,
            ProductionItem::Soldier => 1,
            ProductionItem::Hero(h) => 2 + h as u32,
            ProductionItem::Mirror => 8,
            ProductionItem::Upgrade(u) => 16 + u as u32,
        }
    }
}

/// Lifecycle of the item at the head of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionState {
    /// Nothing queued and nothing in flight.
    Idle,
    /// Items wait but none has been promoted yet.
    Queued,
    InProgress,
    /// An item finished and has not been collected.
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductionError {
    #[error("production queue is full ({max} items)")]
    QueueFull { max: usize },
}

// ---------------------------------------------------------------------------
// ProductionQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ProductionQueue {
    queue: VecDeque<ProductionItem>,
    current: Option<ProductionItem>,
    progress: Fixed64,
    completed: Option<ProductionItem>,
    max_queue: usize,
}

impl ProductionQueue {
    pub fn new(max_queue: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
            progress: Fixed64::ZERO,
            completed: None,
            max_queue,
        }
    }

    /// Number of items waiting plus the current one.
    pub fn len(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn can_enqueue(&self) -> bool {
        self.len() < self.max_queue
    }

    pub fn enqueue(&mut self, item: ProductionItem) -> Result<(), ProductionError> {
        if !self.can_enqueue() {
            return Err(ProductionError::QueueFull {
                max: self.max_queue,
            });
        }
        self.queue.push_back(item);
        Ok(())
    }

    /// Whether `item` is current or waiting.
    pub fn contains(&self, item: ProductionItem) -> bool {
        self.current == Some(item) || self.queue.contains(&item)
    }

    pub fn current(&self) -> Option<ProductionItem> {
        self.current
    }

    pub fn progress(&self) -> Fixed64 {
        self.progress
    }

    pub fn completed(&self) -> Option<ProductionItem> {
        self.completed
    }

    pub fn queued(&self) -> impl Iterator<Item = ProductionItem> + '_ {
        self.queue.iter().copied()
    }

    pub fn state(&self) -> ProductionState {
        if self.current.is_some() {
            ProductionState::InProgress
        } else if self.completed.is_some() {
            ProductionState::Completed
        } else if !self.queue.is_empty() {
            ProductionState::Queued
        } else {
            ProductionState::Idle
        }
    }

    /// Advance the current item by `dt` seconds.
    ///
    /// Promotes the front of the queue when nothing is current. Progress
    /// only accrues while `powered`. Returns the item that finished this
    /// call, which is also kept in `completed` until taken.
    pub fn advance(
        &mut self,
        dt: Fixed64,
        powered: bool,
        build_time: impl Fn(ProductionItem) -> Fixed64,
    ) -> Option<ProductionItem> {
        if self.current.is_none() {
            self.current = self.queue.pop_front();
            self.progress = Fixed64::ZERO;
        }
        let item = self.current?;
        if !powered {
            return None;
        }

        let step = checked_div_64(dt, build_time(item)).unwrap_or(Fixed64::ONE);
        self.progress = self.progress.saturating_add(step).min(Fixed64::ONE);
        if self.progress < Fixed64::ONE {
            return None;
        }

        self.completed = Some(item);
        self.current = None;
        self.progress = Fixed64::ZERO;
        Some(item)
    }

    /// Collect the last finished item.
    pub fn take_completed(&mut self) -> Option<ProductionItem> {
        self.completed.take()
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Construction {
    progress: Fixed64,
    complete: bool,
    /// Nominal seconds to build at full rate.
    pub build_time: Fixed64,
    /// Energy drawn from the owner's pool over the whole build when it
    /// happens inside influence.
    pub required_energy: Fixed64,
}

impl Construction {
    pub fn new(build_time: Fixed64, required_energy: Fixed64) -> Self {
        Self {
            progress: Fixed64::ZERO,
            complete: false,
            build_time,
            required_energy,
        }
    }

    /// A construction that is already finished.
    pub fn finished() -> Self {
        Self {
            progress: Fixed64::ONE,
            complete: true,
            build_time: Fixed64::ZERO,
            required_energy: Fixed64::ZERO,
        }
    }

    pub fn progress(&self) -> Fixed64 {
        self.progress
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Add `delta` progress. Negative deltas are ignored and progress
    /// clamps at one. Returns `true` on the single call that completes it.
    pub fn advance(&mut self, delta: Fixed64) -> bool {
        if self.complete || delta <= Fixed64::ZERO {
            return false;
        }
        self.progress = self.progress.saturating_add(delta).min(Fixed64::ONE);
        if self.progress >= Fixed64::ONE {
            self.complete = true;
            return true;
        }
        false
    }

    /// Nominal progress for `dt` seconds at full rate.
    pub fn nominal_delta(&self, dt: Fixed64) -> Fixed64 {
        checked_div_64(dt, self.build_time).unwrap_or(Fixed64::ONE)
    }

    /// Energy the build wants over `dt` seconds inside influence.
    pub fn energy_demand(&self, dt: Fixed64) -> Fixed64 {
        self.required_energy.saturating_mul(self.nominal_delta(dt))
    }

    /// Progress bought by `paid` energy. Free builds progress nominally.
    pub fn delta_for_energy(&self, paid: Fixed64, dt: Fixed64) -> Fixed64 {
        if self.required_energy <= Fixed64::ZERO {
            return self.nominal_delta(dt);
        }
        checked_div_64(paid, self.required_energy).unwrap_or(Fixed64::ZERO)
    }

    /// Progress from mirror light received this tick. `incoming_light` is
    /// the energy delivered this tick and `baseline` the light per second
    /// that builds at the nominal rate, so the delta is
    /// `incoming_light / (baseline * build_time)`.
    pub fn delta_for_light(&self, incoming_light: Fixed64, baseline: Fixed64) -> Fixed64 {
        checked_div_64(incoming_light, baseline.saturating_mul(self.build_time))
            .unwrap_or(Fixed64::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f32_to_fixed64;

    fn secs(v: f32) -> Fixed64 {
        f32_to_fixed64(v)
    }

    // -----------------------------------------------------------------------
    // ProductionQueue
    // -----------------------------------------------------------------------

    #[test]
    fn item_completes_once_when_powered_long_enough() {
        let mut q = ProductionQueue::new(5);
        q.enqueue(ProductionItem::Worker).unwrap();
        let dt = secs(1.0 / 60.0);

        let mut completions = 0;
        for _ in 0..90 {
            if q.advance(dt, true, |_| secs(1.0)).is_some() {
                completions += 1;
            }
        }

        assert_eq!(completions, 1);
        assert_eq!(q.completed(), Some(ProductionItem::Worker));
        assert_eq!(q.current(), None);
        assert_eq!(q.state(), ProductionState::Completed);
    }

    #[test]
    fn unpowered_queue_promotes_but_does_not_progress() {
        let mut q = ProductionQueue::new(5);
        q.enqueue(ProductionItem::Soldier).unwrap();
        for _ in 0..100 {
            assert!(q.advance(secs(0.1), false, |_| secs(1.0)).is_none());
        }
        assert_eq!(q.current(), Some(ProductionItem::Soldier));
        assert_eq!(q.progress(), Fixed64::ZERO);
        assert_eq!(q.state(), ProductionState::InProgress);
    }

    #[test]
    fn fifo_order() {
        let mut q = ProductionQueue::new(5);
        q.enqueue(ProductionItem::Worker).unwrap();
        q.enqueue(ProductionItem::Mirror).unwrap();
        let first = q.advance(secs(1.0), true, |_| secs(1.0));
        assert_eq!(first, Some(ProductionItem::Worker));
        let second = q.advance(secs(1.0), true, |_| secs(1.0));
        assert_eq!(second, Some(ProductionItem::Mirror));
        assert!(q.is_empty());
    }

    #[test]
    fn queue_full_is_an_error() {
        let mut q = ProductionQueue::new(2);
        q.enqueue(ProductionItem::Worker).unwrap();
        q.enqueue(ProductionItem::Worker).unwrap();
        assert_eq!(
            q.enqueue(ProductionItem::Worker),
            Err(ProductionError::QueueFull { max: 2 })
        );
    }

    #[test]
    fn zero_build_time_completes_immediately() {
        let mut q = ProductionQueue::new(1);
        q.enqueue(ProductionItem::Soldier).unwrap();
        assert_eq!(
            q.advance(secs(0.01), true, |_| Fixed64::ZERO),
            Some(ProductionItem::Soldier)
        );
    }

    #[test]
    fn take_completed_clears() {
        let mut q = ProductionQueue::new(1);
        q.enqueue(ProductionItem::Worker).unwrap();
        q.advance(secs(2.0), true, |_| secs(1.0));
        assert_eq!(q.take_completed(), Some(ProductionItem::Worker));
        assert_eq!(q.take_completed(), None);
        assert_eq!(q.state(), ProductionState::Idle);
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn construction_flips_exactly_once() {
        let mut c = Construction::new(secs(1.0), Fixed64::ZERO);
        let mut flips = 0;
        let mut last = Fixed64::ZERO;
        for _ in 0..200 {
            if c.advance(secs(0.01)) {
                flips += 1;
            }
            assert!(c.progress() >= last);
            last = c.progress();
        }
        assert_eq!(flips, 1);
        assert!(c.is_complete());
        assert_eq!(c.progress(), Fixed64::ONE);
    }

    #[test]
    fn negative_delta_is_ignored() {
        let mut c = Construction::new(secs(1.0), Fixed64::ZERO);
        c.advance(secs(0.5));
        assert!(!c.advance(secs(-0.25)));
        assert_eq!(c.progress(), secs(0.5));
    }

    #[test]
    fn light_delta_scales_with_baseline() {
        let c = Construction::new(secs(10.0), Fixed64::ZERO);
        // 20 light per second for one second at baseline 20 is a tenth of
        // a 10 second build.
        let delta = c.delta_for_light(secs(20.0), secs(20.0));
        assert!((delta - secs(0.1)).abs() < Fixed64::from_bits(64));
        assert_eq!(c.delta_for_light(secs(5.0), Fixed64::ZERO), Fixed64::ZERO);
    }

    #[test]
    fn energy_delta_is_proportional_to_payment() {
        let c = Construction::new(secs(10.0), secs(100.0));
        assert_eq!(c.delta_for_energy(secs(25.0), secs(1.0)), secs(0.25));
        let free = Construction::new(secs(4.0), Fixed64::ZERO);
        assert_eq!(free.delta_for_energy(Fixed64::ZERO, secs(1.0)), secs(0.25));
    }
}
