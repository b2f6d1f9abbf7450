//! Pointer/section-visibility broadcaster shared by every glowing page
//! section. Pure state machine: no DOM access and no timers — callers pass
//! timestamps in and drive deadlines through `poll`, so the whole module
//! tests natively.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

pub type Millis = f64;

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct PointerSample {
    pub x: f64,
    pub y: f64,
}

impl PointerSample {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: PointerSample) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Viewport-space bounding box of one glowing section.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SectionBounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl SectionBounds {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_origin_size(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self::new(left, top, left + width, top + height)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    // Unmounted or collapsed containers produce zero-size rects; consumers
    // skip the frame instead of chasing a degenerate target.
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
            || !self.left.is_finite()
            || !self.top.is_finite()
            || !self.right.is_finite()
            || !self.bottom.is_finite()
    }

    pub fn contains(&self, sample: PointerSample) -> bool {
        sample.x >= self.left && sample.x <= self.right && sample.y >= self.top && sample.y <= self.bottom
    }

    /// Closest point inside the box, each axis clamped independently.
    pub fn clamp(&self, sample: PointerSample) -> PointerSample {
        PointerSample {
            x: sample.x.clamp(self.left, self.right),
            y: sample.y.clamp(self.top, self.bottom),
        }
    }

    pub fn to_local(&self, sample: PointerSample) -> PointerSample {
        PointerSample {
            x: sample.x - self.left,
            y: sample.y - self.top,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScrollPhase {
    Idle,
    Scrolling,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClaimOutcome {
    /// Selection moved to the claiming section.
    Claimed,
    /// The section already owned the effect; previous is left untouched.
    AlreadyCurrent,
    /// The scroll gate was active; the claim was treated as noise.
    SuppressedByScroll,
}

#[derive(Clone, Copy, Debug)]
pub struct EffectConfig {
    /// Quiet gap after the last scroll event before the gate settles.
    pub quiet_window_ms: Millis,
    /// Minimum spacing between published pointer positions while scrolling.
    pub scroll_publish_interval_ms: Millis,
    /// Exponential smoothing weight applied per glow update.
    pub glow_smoothing: f64,
    /// Remaining distance at or below this snaps the glow onto its target.
    pub glow_snap_px: f64,
    /// How long a released section keeps the effect before it goes dark.
    pub release_linger_ms: Millis,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            quiet_window_ms: 180.0,
            scroll_publish_interval_ms: 80.0,
            glow_smoothing: 0.2,
            glow_snap_px: 1.5,
            release_linger_ms: 500.0,
        }
    }
}

impl EffectConfig {
    fn clamped(self) -> Self {
        Self {
            quiet_window_ms: if self.quiet_window_ms.is_finite() {
                self.quiet_window_ms.max(16.0)
            } else {
                Self::default().quiet_window_ms
            },
            scroll_publish_interval_ms: if self.scroll_publish_interval_ms.is_finite() {
                self.scroll_publish_interval_ms.max(0.0)
            } else {
                Self::default().scroll_publish_interval_ms
            },
            glow_smoothing: if self.glow_smoothing.is_finite() {
                self.glow_smoothing.clamp(0.05, 0.95)
            } else {
                Self::default().glow_smoothing
            },
            glow_snap_px: if self.glow_snap_px.is_finite() {
                self.glow_snap_px.max(0.0)
            } else {
                Self::default().glow_snap_px
            },
            release_linger_ms: if self.release_linger_ms.is_finite() {
                self.release_linger_ms.max(0.0)
            } else {
                Self::default().release_linger_ms
            },
        }
    }
}

/// What changed in one state transition; drives listener notification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateDelta {
    pub pointer: bool,
    pub scroll_phase: bool,
    pub selection: bool,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        !(self.pointer || self.scroll_phase || self.selection)
    }

    fn merge(self, other: StateDelta) -> StateDelta {
        StateDelta {
            pointer: self.pointer || other.pointer,
            scroll_phase: self.scroll_phase || other.scroll_phase,
            selection: self.selection || other.selection,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct EffectSnapshot {
    pub pointer: Option<PointerSample>,
    pub phase: ScrollPhase,
    pub current: Option<String>,
    pub previous: Option<String>,
}

impl EffectSnapshot {
    pub fn is_scrolling(&self) -> bool {
        self.phase == ScrollPhase::Scrolling
    }
}

// Idle -> Scrolling on any scroll event; every further event pushes the
// settle deadline out by the quiet window; poll fires Scrolling -> Idle.
struct ScrollGate {
    phase: ScrollPhase,
    settle_deadline: Millis,
}

impl ScrollGate {
    fn new() -> Self {
        Self {
            phase: ScrollPhase::Idle,
            settle_deadline: 0.0,
        }
    }

    fn on_scroll(&mut self, now: Millis, quiet_window: Millis) -> bool {
        self.settle_deadline = now + quiet_window;
        if self.phase == ScrollPhase::Idle {
            self.phase = ScrollPhase::Scrolling;
            return true;
        }
        false
    }

    fn poll(&mut self, now: Millis) -> bool {
        if self.phase == ScrollPhase::Scrolling && now >= self.settle_deadline {
            self.phase = ScrollPhase::Idle;
            return true;
        }
        false
    }

    fn is_scrolling(&self) -> bool {
        self.phase == ScrollPhase::Scrolling
    }

    fn next_deadline(&self) -> Option<Millis> {
        match self.phase {
            ScrollPhase::Scrolling => Some(self.settle_deadline),
            ScrollPhase::Idle => None,
        }
    }
}

// Keeps the true pointer position separately from the published one so the
// published value can lag (throttled) during scroll and snap back to the
// real position the instant the gate settles.
struct PointerSampler {
    live: Option<PointerSample>,
    published: Option<PointerSample>,
    last_publish_at: Millis,
}

impl PointerSampler {
    fn new() -> Self {
        Self {
            live: None,
            published: None,
            last_publish_at: f64::NEG_INFINITY,
        }
    }

    fn record(&mut self, sample: PointerSample, scrolling: bool, now: Millis, interval: Millis) -> bool {
        self.live = Some(sample);

        if scrolling && now - self.last_publish_at < interval {
            return false;
        }

        self.publish(sample, now)
    }

    fn resync(&mut self, now: Millis) -> bool {
        match self.live {
            Some(sample) => self.publish(sample, now),
            None => false,
        }
    }

    fn publish(&mut self, sample: PointerSample, now: Millis) -> bool {
        if self.published == Some(sample) {
            return false;
        }
        self.published = Some(sample);
        self.last_publish_at = now;
        true
    }

    fn published(&self) -> Option<PointerSample> {
        self.published
    }

    fn live(&self) -> Option<PointerSample> {
        self.live
    }
}

struct PendingRelease {
    section: String,
    deadline: Millis,
}

// Single-writer arbitration of which section owns the effect. previous is
// never equal to current right after an accepted claim: self-claims are
// no-ops, not overwrites.
struct SectionArbiter {
    current: Option<String>,
    previous: Option<String>,
    pending_release: Option<PendingRelease>,
}

impl SectionArbiter {
    fn new() -> Self {
        Self {
            current: None,
            previous: None,
            pending_release: None,
        }
    }

    fn claim(&mut self, id: &str) -> ClaimOutcome {
        // Any claim cancels a scheduled release; the effect is wanted again.
        self.pending_release = None;

        if self.current.as_deref() == Some(id) {
            return ClaimOutcome::AlreadyCurrent;
        }

        self.previous = self.current.take();
        self.current = Some(id.to_string());
        ClaimOutcome::Claimed
    }

    fn release(&mut self, id: &str, now: Millis, linger: Millis) -> bool {
        if self.current.as_deref() != Some(id) {
            return false;
        }

        self.pending_release = Some(PendingRelease {
            section: id.to_string(),
            deadline: now + linger,
        });
        true
    }

    fn poll(&mut self, now: Millis) -> bool {
        let due = match &self.pending_release {
            Some(pending) => now >= pending.deadline && self.current.as_deref() == Some(pending.section.as_str()),
            None => false,
        };

        if due {
            self.pending_release = None;
            self.previous = self.current.take();
            return true;
        }
        false
    }

    fn next_deadline(&self) -> Option<Millis> {
        self.pending_release.as_ref().map(|pending| pending.deadline)
    }
}

/// The coordinated state machine behind the page-wide glow effect. All
/// mutation funnels through here, one designated writer per field.
pub struct EffectBroadcaster {
    config: EffectConfig,
    sampler: PointerSampler,
    gate: ScrollGate,
    arbiter: SectionArbiter,
}

impl EffectBroadcaster {
    pub fn new(config: EffectConfig) -> Self {
        Self {
            config: config.clamped(),
            sampler: PointerSampler::new(),
            gate: ScrollGate::new(),
            arbiter: SectionArbiter::new(),
        }
    }

    pub fn config(&self) -> EffectConfig {
        self.config
    }

    pub fn record_pointer(&mut self, x: f64, y: f64, now: Millis) -> StateDelta {
        let published = self.sampler.record(
            PointerSample::new(x, y),
            self.gate.is_scrolling(),
            now,
            self.config.scroll_publish_interval_ms,
        );
        StateDelta {
            pointer: published,
            ..StateDelta::default()
        }
    }

    pub fn record_scroll(&mut self, now: Millis) -> StateDelta {
        let entered = self.gate.on_scroll(now, self.config.quiet_window_ms);
        StateDelta {
            scroll_phase: entered,
            ..StateDelta::default()
        }
    }

    /// Fires any due deadlines (gate settle, pending release). Settling the
    /// gate resyncs the published pointer to the true last-known position.
    pub fn poll(&mut self, now: Millis) -> StateDelta {
        let mut delta = StateDelta::default();

        if self.gate.poll(now) {
            delta.scroll_phase = true;
            delta.pointer = self.sampler.resync(now);
        }

        if self.arbiter.poll(now) {
            delta.selection = true;
        }

        delta
    }

    pub fn claim_section(&mut self, id: &str, _now: Millis) -> ClaimOutcome {
        if self.gate.is_scrolling() {
            return ClaimOutcome::SuppressedByScroll;
        }
        self.arbiter.claim(id)
    }

    /// Soft release: the section keeps the effect for the linger window and
    /// only goes dark if nothing claims in the meantime.
    pub fn release_section(&mut self, id: &str, now: Millis) -> bool {
        self.arbiter.release(id, now, self.config.release_linger_ms)
    }

    pub fn snapshot(&self) -> EffectSnapshot {
        EffectSnapshot {
            pointer: self.sampler.published(),
            phase: self.gate.phase,
            current: self.arbiter.current.clone(),
            previous: self.arbiter.previous.clone(),
        }
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        match (self.gate.next_deadline(), self.arbiter.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    pub fn phase(&self) -> ScrollPhase {
        self.gate.phase
    }

    pub fn pointer(&self) -> Option<PointerSample> {
        self.sampler.published()
    }

    pub fn live_pointer(&self) -> Option<PointerSample> {
        self.sampler.live()
    }

    pub fn current_section(&self) -> Option<&str> {
        self.arbiter.current.as_deref()
    }

    pub fn previous_section(&self) -> Option<&str> {
        self.arbiter.previous.as_deref()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&EffectSnapshot)>;

struct ListenerSlot {
    id: u64,
    callback: Rc<RefCell<Listener>>,
}

/// Observer wrapper around the broadcaster. Listeners get an immutable
/// snapshot after every state delta; ops invoked from inside a listener are
/// queued and their snapshots delivered FIFO once the in-flight dispatch
/// finishes, so observed order always matches production order.
pub struct EffectBus {
    state: RefCell<EffectBroadcaster>,
    listeners: RefCell<Vec<ListenerSlot>>,
    next_listener_id: Cell<u64>,
    dispatching: Cell<bool>,
    queued: RefCell<VecDeque<EffectSnapshot>>,
}

impl EffectBus {
    pub fn new(config: EffectConfig) -> Self {
        Self {
            state: RefCell::new(EffectBroadcaster::new(config)),
            listeners: RefCell::new(Vec::new()),
            next_listener_id: Cell::new(1),
            dispatching: Cell::new(false),
            queued: RefCell::new(VecDeque::new()),
        }
    }

    pub fn subscribe(&self, listener: impl FnMut(&EffectSnapshot) + 'static) -> SubscriptionId {
        let id = self.next_listener_id.get();
        self.next_listener_id.set(id + 1);
        self.listeners.borrow_mut().push(ListenerSlot {
            id,
            callback: Rc::new(RefCell::new(Box::new(listener))),
        });
        SubscriptionId(id)
    }

    /// Returns false when the subscription was already gone. A listener
    /// removed while a dispatch is in flight still sees that snapshot.
    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|slot| slot.id != subscription.0);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn record_pointer(&self, x: f64, y: f64, now: Millis) {
        let delta = self.state.borrow_mut().record_pointer(x, y, now);
        self.notify_if_changed(delta);
    }

    pub fn record_scroll(&self, now: Millis) {
        let delta = self.state.borrow_mut().record_scroll(now);
        self.notify_if_changed(delta);
    }

    pub fn poll(&self, now: Millis) {
        let delta = self.state.borrow_mut().poll(now);
        self.notify_if_changed(delta);
    }

    pub fn claim_section(&self, id: &str, now: Millis) -> ClaimOutcome {
        let outcome = self.state.borrow_mut().claim_section(id, now);
        if outcome == ClaimOutcome::Claimed {
            self.notify();
        }
        outcome
    }

    pub fn release_section(&self, id: &str, now: Millis) {
        // Scheduling a release is not itself an observable change; the
        // selection delta arrives when poll fires the linger deadline.
        self.state.borrow_mut().release_section(id, now);
    }

    pub fn snapshot(&self) -> EffectSnapshot {
        self.state.borrow().snapshot()
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.state.borrow().next_deadline()
    }

    pub fn config(&self) -> EffectConfig {
        self.state.borrow().config()
    }

    fn notify_if_changed(&self, delta: StateDelta) {
        if !delta.is_empty() {
            self.notify();
        }
    }

    fn notify(&self) {
        let snapshot = self.state.borrow().snapshot();
        self.queued.borrow_mut().push_back(snapshot);

        if self.dispatching.get() {
            return;
        }
        self.dispatching.set(true);

        loop {
            let next = self.queued.borrow_mut().pop_front();
            let Some(snapshot) = next else {
                break;
            };

            // Clone the callback handles first so listeners may subscribe
            // or unsubscribe from inside their own callback.
            let callbacks: Vec<Rc<RefCell<Listener>>> = self
                .listeners
                .borrow()
                .iter()
                .map(|slot| slot.callback.clone())
                .collect();

            for callback in callbacks {
                (callback.borrow_mut())(&snapshot);
            }
        }

        self.dispatching.set(false);
    }
}

/// Per-binding smoothed glow position. The first target is adopted directly
/// (no fly-in from the origin); afterwards each step moves by the smoothing
/// weight and snaps once the remaining distance drops under the threshold.
pub struct GlowTracker {
    position: Option<PointerSample>,
    smoothing: f64,
    snap_px: f64,
}

impl GlowTracker {
    pub fn new(config: &EffectConfig) -> Self {
        let config = config.clamped();
        Self {
            position: None,
            smoothing: config.glow_smoothing,
            snap_px: config.glow_snap_px,
        }
    }

    /// Advances one step toward `target`; returns the new position when it
    /// moved and `None` when the glow is already settled (skip the write).
    pub fn step_toward(&mut self, target: PointerSample) -> Option<PointerSample> {
        let Some(position) = self.position else {
            self.position = Some(target);
            return Some(target);
        };

        let distance = position.distance_to(target);
        if distance == 0.0 {
            return None;
        }

        let next = if distance <= self.snap_px {
            target
        } else {
            PointerSample {
                x: position.x + (target.x - position.x) * self.smoothing,
                y: position.y + (target.y - position.y) * self.smoothing,
            }
        };

        self.position = Some(next);
        Some(next)
    }

    pub fn is_settled_at(&self, target: PointerSample) -> bool {
        self.position == Some(target)
    }

    pub fn position(&self) -> Option<PointerSample> {
        self.position
    }

    /// Forget the tracked position so the next activation snaps fresh
    /// instead of flying in from wherever the glow last sat.
    pub fn clear(&mut self) {
        self.position = None;
    }
}

/// Glow target in section-local coordinates: the published pointer clamped
/// per-axis into the section box. For an in-bounds pointer this is the
/// pointer itself; outside, the glow leans toward it from the nearest edge.
pub fn glow_target(bounds: &SectionBounds, pointer: PointerSample) -> PointerSample {
    bounds.to_local(bounds.clamp(pointer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcaster() -> EffectBroadcaster {
        EffectBroadcaster::new(EffectConfig::default())
    }

    #[test]
    fn scroll_burst_within_quiet_window_keeps_gate_scrolling() {
        let mut fx = broadcaster();

        for t in [0.0, 20.0, 40.0, 60.0, 80.0] {
            fx.record_scroll(t);
            assert_eq!(fx.phase(), ScrollPhase::Scrolling);
            fx.poll(t);
            assert_eq!(fx.phase(), ScrollPhase::Scrolling, "gate must hold through the burst");
        }

        // Last event at 80ms; quiet window 180ms; settle exactly at 260ms.
        fx.poll(259.0);
        assert_eq!(fx.phase(), ScrollPhase::Scrolling);
        fx.poll(260.0);
        assert_eq!(fx.phase(), ScrollPhase::Idle);
    }

    #[test]
    fn gate_reports_idle_only_after_quiet_window() {
        let mut fx = broadcaster();
        fx.record_scroll(100.0);

        let delta = fx.poll(279.9);
        assert!(!delta.scroll_phase);

        let delta = fx.poll(280.0);
        assert!(delta.scroll_phase);
        assert_eq!(fx.phase(), ScrollPhase::Idle);
    }

    #[test]
    fn pointer_publishes_immediately_while_idle() {
        let mut fx = broadcaster();

        let delta = fx.record_pointer(12.0, 34.0, 0.0);
        assert!(delta.pointer);
        assert_eq!(fx.pointer(), Some(PointerSample::new(12.0, 34.0)));

        // Same coordinates again: no observable change.
        let delta = fx.record_pointer(12.0, 34.0, 5.0);
        assert!(!delta.pointer);
    }

    #[test]
    fn pointer_updates_throttle_while_scrolling() {
        let mut fx = broadcaster();
        fx.record_pointer(0.0, 0.0, 0.0);
        fx.record_scroll(1000.0);

        // First move since the window elapsed publishes.
        assert!(fx.record_pointer(10.0, 10.0, 1010.0).pointer);
        // Within 80ms of the last publish: buffered, not published.
        assert!(!fx.record_pointer(20.0, 20.0, 1030.0).pointer);
        assert!(!fx.record_pointer(30.0, 30.0, 1050.0).pointer);

        assert_eq!(fx.pointer(), Some(PointerSample::new(10.0, 10.0)));
        assert_eq!(fx.live_pointer(), Some(PointerSample::new(30.0, 30.0)));

        // Past the interval the buffered position may publish again.
        assert!(fx.record_pointer(40.0, 40.0, 1095.0).pointer);
    }

    #[test]
    fn published_pointer_resyncs_when_gate_settles() {
        let mut fx = broadcaster();
        fx.record_pointer(0.0, 0.0, 0.0);
        fx.record_scroll(100.0);
        fx.record_pointer(50.0, 60.0, 110.0);
        fx.record_pointer(70.0, 80.0, 130.0);

        assert_ne!(fx.pointer(), fx.live_pointer(), "position must lag during scroll");

        let delta = fx.poll(400.0);
        assert!(delta.scroll_phase);
        assert!(delta.pointer);
        assert_eq!(fx.pointer(), Some(PointerSample::new(70.0, 80.0)));
    }

    #[test]
    fn claim_moves_current_and_remembers_previous() {
        let mut fx = broadcaster();

        assert_eq!(fx.claim_section("hero", 0.0), ClaimOutcome::Claimed);
        assert_eq!(fx.claim_section("features", 10.0), ClaimOutcome::Claimed);

        assert_eq!(fx.current_section(), Some("features"));
        assert_eq!(fx.previous_section(), Some("hero"));
    }

    #[test]
    fn repeated_claim_is_idempotent() {
        let mut fx = broadcaster();
        fx.claim_section("hero", 0.0);
        fx.claim_section("features", 10.0);

        assert_eq!(fx.claim_section("features", 20.0), ClaimOutcome::AlreadyCurrent);
        assert_eq!(fx.previous_section(), Some("hero"), "self-claim must not overwrite previous");
        assert_ne!(fx.current_section(), fx.previous_section());
    }

    #[test]
    fn claims_are_suppressed_while_scrolling() {
        let mut fx = broadcaster();
        fx.record_scroll(0.0);

        assert_eq!(fx.claim_section("hero", 10.0), ClaimOutcome::SuppressedByScroll);
        assert_eq!(fx.current_section(), None);

        fx.poll(300.0);
        assert_eq!(fx.claim_section("hero", 310.0), ClaimOutcome::Claimed);
    }

    #[test]
    fn release_defers_then_clears_current() {
        let mut fx = broadcaster();
        fx.claim_section("cta", 0.0);
        assert!(fx.release_section("cta", 100.0));

        // Linger window is 500ms: still owned right up to the deadline.
        assert!(fx.poll(599.0).is_empty());
        assert_eq!(fx.current_section(), Some("cta"));

        let delta = fx.poll(600.0);
        assert!(delta.selection);
        assert_eq!(fx.current_section(), None);
        assert_eq!(fx.previous_section(), Some("cta"));
    }

    #[test]
    fn reclaim_during_linger_cancels_release() {
        let mut fx = broadcaster();
        fx.claim_section("hero", 0.0);
        fx.release_section("hero", 100.0);

        // Pointer re-entered before the linger elapsed: zero flicker.
        assert_eq!(fx.claim_section("hero", 300.0), ClaimOutcome::AlreadyCurrent);
        assert!(fx.poll(2000.0).is_empty());
        assert_eq!(fx.current_section(), Some("hero"));
    }

    #[test]
    fn claiming_another_section_overrides_pending_release() {
        let mut fx = broadcaster();
        fx.claim_section("hero", 0.0);
        fx.release_section("hero", 100.0);
        fx.claim_section("features", 200.0);

        assert!(fx.poll(2000.0).is_empty());
        assert_eq!(fx.current_section(), Some("features"));
        assert_eq!(fx.previous_section(), Some("hero"));
    }

    #[test]
    fn releasing_a_section_that_is_not_current_is_ignored() {
        let mut fx = broadcaster();
        fx.claim_section("hero", 0.0);

        assert!(!fx.release_section("features", 10.0));
        assert!(fx.poll(2000.0).is_empty());
        assert_eq!(fx.current_section(), Some("hero"));
    }

    #[test]
    fn snapshot_before_any_pointer_event_has_no_position() {
        let fx = broadcaster();
        let snapshot = fx.snapshot();

        assert_eq!(snapshot.pointer, None);
        assert_eq!(snapshot.phase, ScrollPhase::Idle);
        assert_eq!(snapshot.current, None);
    }

    #[test]
    fn next_deadline_reports_earliest_pending_timer() {
        let mut fx = broadcaster();
        assert_eq!(fx.next_deadline(), None);

        fx.claim_section("hero", 0.0);
        fx.release_section("hero", 0.0); // release deadline 500
        fx.record_scroll(400.0); // settle deadline 580

        assert_eq!(fx.next_deadline(), Some(500.0));
        fx.poll(500.0);
        assert_eq!(fx.next_deadline(), Some(580.0));
    }

    #[test]
    fn config_out_of_range_values_are_clamped() {
        let config = EffectConfig {
            quiet_window_ms: 1.0,
            scroll_publish_interval_ms: -5.0,
            glow_smoothing: 2.0,
            glow_snap_px: -1.0,
            release_linger_ms: f64::NAN,
        }
        .clamped();

        assert_eq!(config.quiet_window_ms, 16.0);
        assert_eq!(config.scroll_publish_interval_ms, 0.0);
        assert_eq!(config.glow_smoothing, 0.95);
        assert_eq!(config.glow_snap_px, 0.0);
        assert_eq!(config.release_linger_ms, 500.0);
    }

    #[test]
    fn glow_target_keeps_in_bounds_pointer_exact() {
        let bounds = SectionBounds::from_origin_size(50.0, 40.0, 300.0, 300.0);
        let target = glow_target(&bounds, PointerSample::new(120.0, 90.0));

        assert_eq!(target, PointerSample::new(70.0, 50.0));
    }

    #[test]
    fn glow_target_clamps_outside_pointer_to_boundary() {
        let bounds = SectionBounds::from_origin_size(50.0, 40.0, 300.0, 300.0);

        // Only x out of range: lands on the right edge, y passes through.
        let side = glow_target(&bounds, PointerSample::new(400.0, 150.0));
        assert_eq!(side, PointerSample::new(300.0, 110.0));

        // Both axes out: the nearest corner.
        let corner = glow_target(&bounds, PointerSample::new(500.0, 500.0));
        assert_eq!(corner, PointerSample::new(300.0, 300.0));
    }

    #[test]
    fn degenerate_bounds_are_detected() {
        assert!(SectionBounds::from_origin_size(0.0, 0.0, 0.0, 100.0).is_degenerate());
        assert!(SectionBounds::from_origin_size(0.0, 0.0, 100.0, 0.0).is_degenerate());
        assert!(SectionBounds::new(0.0, 0.0, f64::NAN, 10.0).is_degenerate());
        assert!(!SectionBounds::from_origin_size(0.0, 0.0, 1.0, 1.0).is_degenerate());
    }

    #[test]
    fn glow_converges_within_one_pixel_for_sampled_smoothing_weights() {
        for smoothing in [0.2, 0.5, 0.7] {
            let config = EffectConfig {
                glow_smoothing: smoothing,
                ..EffectConfig::default()
            };
            let mut tracker = GlowTracker::new(&config);
            tracker.step_toward(PointerSample::new(0.0, 0.0));

            let target = PointerSample::new(200.0, 120.0);
            let mut steps = 0;
            while !tracker.is_settled_at(target) {
                tracker.step_toward(target);
                steps += 1;
                assert!(steps < 100, "k={smoothing} failed to converge");
            }

            let position = tracker.position().expect("tracker has a position");
            assert!(position.distance_to(target) <= 1.0);
        }
    }

    #[test]
    fn glow_first_target_is_adopted_without_fly_in() {
        let mut tracker = GlowTracker::new(&EffectConfig::default());
        let first = tracker.step_toward(PointerSample::new(77.0, 33.0));

        assert_eq!(first, Some(PointerSample::new(77.0, 33.0)));
    }

    #[test]
    fn glow_snaps_below_threshold_then_goes_quiet() {
        let mut tracker = GlowTracker::new(&EffectConfig::default());
        tracker.step_toward(PointerSample::new(100.0, 100.0));

        let target = PointerSample::new(101.0, 100.0);
        assert_eq!(tracker.step_toward(target), Some(target), "sub-threshold move snaps exactly");
        assert_eq!(tracker.step_toward(target), None, "settled glow reports no redundant work");
    }

    #[test]
    fn bus_delivers_snapshots_and_unsubscribe_stops_them() {
        let bus = Rc::new(EffectBus::new(EffectConfig::default()));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        let subscription = bus.subscribe(move |snapshot| {
            sink.borrow_mut().push(snapshot.pointer);
        });

        bus.record_pointer(1.0, 2.0, 0.0);
        assert_eq!(seen.borrow().len(), 1);

        assert!(bus.unsubscribe(subscription));
        bus.record_pointer(3.0, 4.0, 10.0);
        assert_eq!(seen.borrow().len(), 1);
        assert!(!bus.unsubscribe(subscription));
    }

    #[test]
    fn ops_from_inside_a_listener_dispatch_in_production_order() {
        let bus = Rc::new(EffectBus::new(EffectConfig::default()));
        let order = Rc::new(RefCell::new(Vec::new()));

        let reentrant_bus = bus.clone();
        let log_a = order.clone();
        bus.subscribe(move |snapshot| {
            log_a.borrow_mut().push(("a", snapshot.current.clone()));
            if snapshot.current.is_none() {
                reentrant_bus.claim_section("hero", 1.0);
            }
        });

        let log_b = order.clone();
        bus.subscribe(move |snapshot| {
            log_b.borrow_mut().push(("b", snapshot.current.clone()));
        });

        bus.record_pointer(5.0, 5.0, 0.0);

        let observed = order.borrow();
        assert_eq!(
            observed.as_slice(),
            &[
                ("a", None),
                ("b", None),
                ("a", Some("hero".to_string())),
                ("b", Some("hero".to_string())),
            ],
            "the queued claim snapshot must arrive after the in-flight dispatch completes"
        );
    }

    #[test]
    fn subscribing_from_inside_a_listener_does_not_panic() {
        let bus = Rc::new(EffectBus::new(EffectConfig::default()));
        let inner_bus = bus.clone();
        let added = Rc::new(Cell::new(false));

        let added_flag = added.clone();
        bus.subscribe(move |_| {
            if !added_flag.get() {
                added_flag.set(true);
                inner_bus.subscribe(|_| {});
            }
        });

        bus.record_pointer(1.0, 1.0, 0.0);
        assert_eq!(bus.listener_count(), 2);
    }

    // The full §-style walkthrough: hover the hero, smooth to the pointer,
    // ride out a scroll burst, resync when the page settles.
    #[test]
    fn hero_hover_then_scroll_burst_scenario() {
        let mut fx = broadcaster();
        let bounds = SectionBounds::from_origin_size(0.0, 0.0, 300.0, 300.0);
        let mut tracker = GlowTracker::new(&fx.config());

        // Pointer enters the hero at (100, 50).
        fx.record_pointer(100.0, 50.0, 0.0);
        assert_eq!(fx.claim_section("hero", 0.0), ClaimOutcome::Claimed);

        // Glow smooths toward the pointer and lands exactly on it.
        let pointer = fx.pointer().expect("pointer was recorded");
        let target = glow_target(&bounds, pointer);
        let mut steps = 0;
        while !tracker.is_settled_at(target) {
            tracker.step_toward(target);
            steps += 1;
            assert!(steps < 100);
        }
        assert_eq!(tracker.position(), Some(PointerSample::new(100.0, 50.0)));

        // Scroll burst: 5 events 20ms apart, pointer drifting during it.
        for (index, t) in [1000.0, 1020.0, 1040.0, 1060.0, 1080.0].into_iter().enumerate() {
            fx.record_scroll(t);
            fx.poll(t);
            assert_eq!(fx.phase(), ScrollPhase::Scrolling);
            assert_eq!(fx.current_section(), Some("hero"), "selection holds through the burst");

            if index == 1 {
                fx.record_pointer(120.0, 60.0, t + 5.0);
            }
            if index == 3 {
                // Throttled: within the publish interval of the previous move.
                fx.record_pointer(140.0, 80.0, t + 5.0);
            }
        }
        assert_eq!(fx.pointer(), Some(PointerSample::new(120.0, 60.0)));
        assert_eq!(fx.live_pointer(), Some(PointerSample::new(140.0, 80.0)));

        // Quiet window after the last event at 1080: idle at 1260.
        assert!(fx.poll(1259.0).is_empty());
        let delta = fx.poll(1260.0);
        assert!(delta.scroll_phase);
        assert!(delta.pointer, "gate settle must resync the published pointer");
        assert_eq!(fx.phase(), ScrollPhase::Idle);
        assert_eq!(fx.pointer(), Some(PointerSample::new(140.0, 80.0)));

        // The glow follows the resynced position.
        let resynced = glow_target(&bounds, fx.pointer().expect("pointer available"));
        let mut steps = 0;
        while !tracker.is_settled_at(resynced) {
            tracker.step_toward(resynced);
            steps += 1;
            assert!(steps < 100);
        }
        assert_eq!(tracker.position(), Some(PointerSample::new(140.0, 80.0)));
    }
}
