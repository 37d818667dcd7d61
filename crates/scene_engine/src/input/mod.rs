//! Input events and their dispatch contract
//!
//! The windowing layer translates its native events into [`InputEvent`] and
//! hands them to the engine during the polling phase of each loop iteration.
//! Receivers answer with an [`EventResponse`]; `Handled` stops the event from
//! reaching lower-priority receivers.

use std::collections::HashSet;

/// An input event delivered to layers and the camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// A key went down (or auto-repeated)
    KeyPressed {
        /// The key
        key: KeyCode,
        /// Number of auto-repeats; 0 for the initial press
        repeat: u32,
    },

    /// A key was released
    KeyReleased(KeyCode),

    /// Cursor moved, in window pixels
    MouseMoved {
        /// New X coordinate
        x: f64,
        /// New Y coordinate
        y: f64,
    },

    /// Mouse button event
    MouseButton {
        /// The mouse button that was pressed/released
        button: MouseButton,
        /// Whether the button was pressed (true) or released (false)
        pressed: bool,
    },

    /// Scroll wheel or trackpad scroll
    Scroll {
        /// Horizontal offset
        dx: f64,
        /// Vertical offset
        dy: f64,
    },

    /// Window framebuffer was resized
    WindowResized {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },
}

impl InputEvent {
    /// Whether this is a pointer event (move, button, scroll)
    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            Self::MouseMoved { .. } | Self::MouseButton { .. } | Self::Scroll { .. }
        )
    }
}

/// Result of offering an event to a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventResponse {
    /// Pass the event on
    #[default]
    Unhandled,
    /// Consumed; lower-priority receivers will not see it
    Handled,
}

impl EventResponse {
    /// Whether the event was consumed
    pub fn is_handled(self) -> bool {
        self == Self::Handled
    }
}

/// Key codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A key
    A,
    /// D key
    D,
    /// E key
    E,
    /// Q key
    Q,
    /// S key
    S,
    /// W key
    W,
    /// Space key
    Space,
    /// Left shift
    LeftShift,
    /// Enter key
    Enter,
    /// Escape key
    Escape,
    /// Up arrow
    Up,
    /// Down arrow
    Down,
    /// Left arrow
    Left,
    /// Right arrow
    Right,
    /// Any key the engine does not name, by platform scancode
    Other(u32),
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left mouse button
    Left,
    /// Right mouse button
    Right,
    /// Middle mouse button
    Middle,
}

/// Tracks which keys and buttons are currently held
#[derive(Debug, Clone, Default)]
pub struct InputState {
    keys: HashSet<KeyCode>,
    buttons: HashSet<MouseButton>,
    cursor: (f64, f64),
}

impl InputState {
    /// Create an empty input state
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an event into the held-state tables
    pub fn apply(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::KeyPressed { key, .. } => {
                self.keys.insert(key);
            }
            InputEvent::KeyReleased(key) => {
                self.keys.remove(&key);
            }
            InputEvent::MouseButton { button, pressed: true } => {
                self.buttons.insert(button);
            }
            InputEvent::MouseButton { button, pressed: false } => {
                self.buttons.remove(&button);
            }
            InputEvent::MouseMoved { x, y } => self.cursor = (x, y),
            InputEvent::Scroll { .. } | InputEvent::WindowResized { .. } => {}
        }
    }

    /// Whether a key is held
    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    /// Whether a mouse button is held
    pub fn is_button_down(&self, button: MouseButton) -> bool {
        self.buttons.contains(&button)
    }

    /// Last known cursor position
    pub fn cursor(&self) -> (f64, f64) {
        self.cursor
    }
}

/// Source of input events, implemented by the windowing layer
pub trait EventSource {
    /// Append pending events to `events`; return `false` once the window wants to close
    fn poll(&mut self, events: &mut Vec<InputEvent>) -> bool;
}
