/// Input state cache and listener registry
///
/// Raw device events arrive from the window shell as `InputEvent`s. Two
/// internal listeners keep a boolean per key code; gameplay code samples
/// that cache every frame instead of handling events directly. External
/// listeners (mouse look, fire button) can be registered per game session
/// and are torn down wholesale on restart.

use std::collections::HashMap;

use winit::event::MouseButton;
use winit::keyboard::KeyCode;

/// A translated device event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    /// Relative motion, in device units.
    MouseMove { dx: f64, dy: f64 },
    MouseDown(MouseButton),
    MouseUp(MouseButton),
    /// Synthesized on button release, after the matching `MouseUp`.
    Click(MouseButton),
}

impl InputEvent {
    fn kind(&self) -> ListenerKind {
        match self {
            InputEvent::KeyDown(_) => ListenerKind::KeyDown,
            InputEvent::KeyUp(_) => ListenerKind::KeyUp,
            InputEvent::MouseMove { .. } => ListenerKind::MouseMove,
            InputEvent::MouseDown(_) => ListenerKind::MouseDown,
            InputEvent::MouseUp(_) => ListenerKind::MouseUp,
            InputEvent::Click(_) => ListenerKind::Click,
        }
    }
}

/// Which event stream a listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    KeyDown,
    KeyUp,
    MouseMove,
    Click,
    MouseDown,
    MouseUp,
}

enum ListenerAction {
    /// Internal: write the key into the cache as held.
    RecordKeyDown,
    /// Internal: write the key into the cache as released.
    RecordKeyUp,
    External(Box<dyn FnMut(&InputEvent)>),
}

struct Listener {
    kind: ListenerKind,
    action: ListenerAction,
}

/// Key-state cache plus the listener registry.
pub struct Input {
    key_map: HashMap<KeyCode, bool>,
    listeners: Vec<Listener>,
}

impl Input {
    pub fn new() -> Self {
        let mut input = Self {
            key_map: HashMap::new(),
            listeners: Vec::new(),
        };
        input.register_internal_listeners();
        input
    }

    fn register_internal_listeners(&mut self) {
        self.listeners.push(Listener {
            kind: ListenerKind::KeyDown,
            action: ListenerAction::RecordKeyDown,
        });
        self.listeners.push(Listener {
            kind: ListenerKind::KeyUp,
            action: ListenerAction::RecordKeyUp,
        });
    }

    /// Mark a key as held. Last write wins; there is no event queue, so a
    /// press-and-release between two samples reads as released.
    pub fn record_key_down(&mut self, code: KeyCode) {
        self.key_map.insert(code, true);
    }

    /// Mark a key as released.
    pub fn record_key_up(&mut self, code: KeyCode) {
        self.key_map.insert(code, false);
    }

    /// Current held state. Codes never observed read as released.
    pub fn is_key_down(&self, code: KeyCode) -> bool {
        self.key_map.get(&code).copied().unwrap_or(false)
    }

    /// Register an external listener for one event stream.
    pub fn add_listener<F>(&mut self, kind: ListenerKind, callback: F)
    where
        F: FnMut(&InputEvent) + 'static,
    {
        self.listeners.push(Listener {
            kind,
            action: ListenerAction::External(Box::new(callback)),
        });
    }

    /// Drop every listener, then re-register exactly the two internal
    /// key-state listeners. Safe to call any number of times, which is what
    /// makes repeated game restarts leak-free.
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
        self.register_internal_listeners();
    }

    /// Number of active listeners, internal ones included.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Fan one event out to every listener of its kind, in registration
    /// order.
    pub fn dispatch(&mut self, event: &InputEvent) {
        let kind = event.kind();
        for i in 0..self.listeners.len() {
            if self.listeners[i].kind != kind {
                continue;
            }
            let mut record = None;
            match &mut self.listeners[i].action {
                ListenerAction::RecordKeyDown => {
                    if let InputEvent::KeyDown(code) = event {
                        record = Some((*code, true));
                    }
                }
                ListenerAction::RecordKeyUp => {
                    if let InputEvent::KeyUp(code) = event {
                        record = Some((*code, false));
                    }
                }
                ListenerAction::External(callback) => callback(event),
            }
            if let Some((code, down)) = record {
                self.key_map.insert(code, down);
            }
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn unobserved_key_reads_released() {
        let input = Input::new();
        assert!(!input.is_key_down(KeyCode::KeyW));
    }

    #[test]
    fn key_state_follows_last_write() {
        let mut input = Input::new();
        input.record_key_down(KeyCode::Space);
        assert!(input.is_key_down(KeyCode::Space));

        input.record_key_up(KeyCode::Space);
        assert!(!input.is_key_down(KeyCode::Space));
    }

    #[test]
    fn dispatch_updates_cache_through_internal_listeners() {
        let mut input = Input::new();
        input.dispatch(&InputEvent::KeyDown(KeyCode::KeyW));
        assert!(input.is_key_down(KeyCode::KeyW));

        input.dispatch(&InputEvent::KeyUp(KeyCode::KeyW));
        assert!(!input.is_key_down(KeyCode::KeyW));
    }

    #[test]
    fn clear_listeners_leaves_exactly_two() {
        let mut input = Input::new();
        assert_eq!(input.listener_count(), 2);

        input.add_listener(ListenerKind::MouseMove, |_| {});
        input.add_listener(ListenerKind::Click, |_| {});
        assert_eq!(input.listener_count(), 4);

        for _ in 0..5 {
            input.clear_listeners();
            assert_eq!(input.listener_count(), 2);
        }

        // The cache still works after the reset.
        input.dispatch(&InputEvent::KeyDown(KeyCode::KeyA));
        assert!(input.is_key_down(KeyCode::KeyA));
    }

    #[test]
    fn external_listeners_stop_firing_after_clear() {
        let hits = Rc::new(RefCell::new(0));
        let mut input = Input::new();

        let counter = Rc::clone(&hits);
        input.add_listener(ListenerKind::Click, move |_| {
            *counter.borrow_mut() += 1;
        });

        input.dispatch(&InputEvent::Click(MouseButton::Left));
        assert_eq!(*hits.borrow(), 1);

        input.clear_listeners();
        input.dispatch(&InputEvent::Click(MouseButton::Left));
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut input = Input::new();

        for tag in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            input.add_listener(ListenerKind::MouseDown, move |_| {
                order.borrow_mut().push(tag);
            });
        }

        input.dispatch(&InputEvent::MouseDown(MouseButton::Left));
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }
}
