//! Browser binding for the effect broadcaster: window listeners feed pointer
//! and scroll events into the bus, and a parked requestAnimationFrame loop
//! drives deadlines and moves each bound section's glow through CSS custom
//! properties. All policy lives in [`crate::effect`]; this module only wires
//! it to the DOM.

use crate::effect::{
    glow_target, ClaimOutcome, EffectBus, EffectConfig, EffectSnapshot, GlowTracker,
    PointerSample, SectionBounds, SubscriptionId,
};
use gloo_events::EventListener;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::{HtmlElement, MouseEvent};

struct Binding {
    element: HtmlElement,
    tracker: GlowTracker,
}

struct ContextInner {
    bus: EffectBus,
    bindings: RefCell<HashMap<String, Binding>>,
    // Window listeners are kept alive here; dropping them detaches.
    listeners: RefCell<Vec<EventListener>>,
    raf_handle: Cell<Option<i32>>,
    raf_closure: RefCell<Option<Closure<dyn FnMut()>>>,
    enabled: bool,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if let (Some(handle), Some(window)) = (self.raf_handle.take(), web_sys::window()) {
            let _ = window.cancel_animation_frame(handle);
        }
    }
}

/// Shared handle to one mounted effect pipeline. Cloning is cheap; equality
/// is identity so it can ride through a `ContextProvider` without forcing
/// rerenders.
#[derive(Clone)]
pub struct EffectContext {
    inner: Rc<ContextInner>,
}

impl PartialEq for EffectContext {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl EffectContext {
    /// Attaches window listeners and returns the context. On hover-less
    /// (touch) devices the context mounts inert: no listeners, no frames,
    /// claims ignored.
    pub fn mount(config: EffectConfig) -> Self {
        let enabled = hover_pointer_available();
        let inner = Rc::new(ContextInner {
            bus: EffectBus::new(config),
            bindings: RefCell::new(HashMap::new()),
            listeners: RefCell::new(Vec::new()),
            raf_handle: Cell::new(None),
            raf_closure: RefCell::new(None),
            enabled,
        });

        if enabled {
            if let Some(window) = web_sys::window() {
                let weak = Rc::downgrade(&inner);
                let pointermove = EventListener::new(&window, "pointermove", move |event| {
                    let Some(inner) = weak.upgrade() else { return };
                    if let Some(event) = event.dyn_ref::<MouseEvent>() {
                        inner.bus.record_pointer(
                            f64::from(event.client_x()),
                            f64::from(event.client_y()),
                            now_millis(),
                        );
                        schedule_frame(&inner);
                    }
                });

                let weak = Rc::downgrade(&inner);
                let scroll = EventListener::new(&window, "scroll", move |_event| {
                    let Some(inner) = weak.upgrade() else { return };
                    inner.bus.record_scroll(now_millis());
                    schedule_frame(&inner);
                });

                inner.listeners.borrow_mut().push(pointermove);
                inner.listeners.borrow_mut().push(scroll);
            }
        }

        Self { inner }
    }

    pub fn enabled(&self) -> bool {
        self.inner.enabled
    }

    /// Binds a section element so frames can position its glow. Re-registering
    /// an id replaces the element and restarts its tracker.
    pub fn register_section(&self, id: &str, element: HtmlElement) {
        if !self.inner.enabled {
            return;
        }

        self.inner.bindings.borrow_mut().insert(
            id.to_string(),
            Binding {
                element,
                tracker: GlowTracker::new(&self.inner.bus.config()),
            },
        );
        schedule_frame(&self.inner);
    }

    pub fn unregister_section(&self, id: &str) {
        self.inner.bindings.borrow_mut().remove(id);
    }

    pub fn claim(&self, id: &str) -> Option<ClaimOutcome> {
        if !self.inner.enabled {
            return None;
        }

        let outcome = self.inner.bus.claim_section(id, now_millis());
        schedule_frame(&self.inner);
        Some(outcome)
    }

    pub fn release(&self, id: &str) {
        if !self.inner.enabled {
            return;
        }

        self.inner.bus.release_section(id, now_millis());
        schedule_frame(&self.inner);
    }

    pub fn subscribe(&self, listener: impl FnMut(&EffectSnapshot) + 'static) -> SubscriptionId {
        self.inner.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        self.inner.bus.unsubscribe(subscription);
    }

    pub fn snapshot(&self) -> EffectSnapshot {
        self.inner.bus.snapshot()
    }
}

/// One animation frame: fire due deadlines, move every engaged glow a step,
/// then either re-arm or park. Parked is the steady state; input events and
/// claims wake the loop back up.
fn run_frame(inner: &Rc<ContextInner>) {
    inner.raf_handle.set(None);

    let now = now_millis();
    inner.bus.poll(now);
    let snapshot = inner.bus.snapshot();

    let mut unsettled = false;
    {
        let mut bindings = inner.bindings.borrow_mut();
        for (id, binding) in bindings.iter_mut() {
            let engaged = snapshot.current.as_deref() == Some(id.as_str())
                || snapshot.previous.as_deref() == Some(id.as_str());
            if !engaged {
                binding.tracker.clear();
                continue;
            }

            let Some(pointer) = snapshot.pointer else {
                continue;
            };

            let rect = binding.element.get_bounding_client_rect();
            let bounds =
                SectionBounds::from_origin_size(rect.left(), rect.top(), rect.width(), rect.height());
            if bounds.is_degenerate() {
                continue;
            }

            let target = glow_target(&bounds, pointer);
            if let Some(position) = binding.tracker.step_toward(target) {
                apply_glow(&binding.element, position);
            }
            if !binding.tracker.is_settled_at(target) {
                unsettled = true;
            }
        }
    }

    if unsettled || inner.bus.next_deadline().is_some() {
        schedule_frame(inner);
    }
}

fn schedule_frame(inner: &Rc<ContextInner>) {
    if !inner.enabled || inner.raf_handle.get().is_some() {
        return;
    }
    let Some(window) = web_sys::window() else {
        return;
    };

    if inner.raf_closure.borrow().is_none() {
        let weak = Rc::downgrade(inner);
        let closure: Closure<dyn FnMut()> = Closure::new(move || {
            if let Some(inner) = weak.upgrade() {
                run_frame(&inner);
            }
        });
        *inner.raf_closure.borrow_mut() = Some(closure);
    }

    if let Some(closure) = inner.raf_closure.borrow().as_ref() {
        if let Ok(handle) = window.request_animation_frame(closure.as_ref().unchecked_ref()) {
            inner.raf_handle.set(Some(handle));
        }
    }
}

fn apply_glow(element: &HtmlElement, position: PointerSample) {
    let style = element.style();
    let _ = style.set_property("--glow-x", &format!("{:.1}px", position.x));
    let _ = style.set_property("--glow-y", &format!("{:.1}px", position.y));
}

/// Touch-first devices report `(hover: none)`; the glow pipeline stays off
/// there rather than chasing synthetic mouse events.
fn hover_pointer_available() -> bool {
    let Some(window) = web_sys::window() else {
        return false;
    };

    match window.match_media("(hover: none)") {
        Ok(Some(query)) => !query.matches(),
        _ => true,
    }
}

fn now_millis() -> f64 {
    web_sys::window()
        .and_then(|window| window.performance())
        .map(|performance| performance.now())
        .unwrap_or_else(js_sys::Date::now)
}
