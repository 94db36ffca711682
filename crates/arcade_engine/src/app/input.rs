use std::collections::VecDeque;

use crate::geom::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Space,
    Enter,
    Escape,
    Pause,
    Step,
}

const KEY_COUNT: usize = 9;

impl Key {
    const fn index(self) -> usize {
        match self {
            Key::Up => 0,
            Key::Down => 1,
            Key::Left => 2,
            Key::Right => 3,
            Key::Space => 4,
            Key::Enter => 5,
            Key::Escape => 6,
            Key::Pause => 7,
            Key::Step => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// Normalized device event pushed by a platform adapter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { position: Vec2, button: PointerButton },
    PointerMove { position: Vec2 },
    PointerUp { position: Vec2, button: PointerButton },
    KeyDown(Key),
    KeyUp(Key),
}

#[derive(Debug, Clone, Copy, Default)]
struct KeyStates {
    down: [bool; KEY_COUNT],
    pressed: [bool; KEY_COUNT],
    released: [bool; KEY_COUNT],
}

/// Input state as seen by logic steps. Events queue between steps and are
/// folded in during the input update; press/release edges last one step.
#[derive(Debug, Clone)]
pub struct Input {
    queue: VecDeque<InputEvent>,
    keys: KeyStates,
    pointer: Option<Vec2>,
    pointer_down: [bool; 2],
    pointer_pressed: [bool; 2],
    pointer_released: [bool; 2],
    pub enabled: bool,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            keys: KeyStates::default(),
            pointer: None,
            pointer_down: [false; 2],
            pointer_pressed: [false; 2],
            pointer_released: [false; 2],
            enabled: true,
        }
    }
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InputEvent) {
        self.queue.push_back(event);
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn update(&mut self) {
        self.clear_edges();
        if !self.enabled {
            self.queue.clear();
            return;
        }
        while let Some(event) = self.queue.pop_front() {
            self.apply(event);
        }
    }

    /// Tracks the pointer while paused but never produces edges.
    pub fn pause_update(&mut self) {
        self.clear_edges();
        while let Some(event) = self.queue.pop_front() {
            match event {
                InputEvent::PointerMove { position }
                | InputEvent::PointerDown { position, .. }
                | InputEvent::PointerUp { position, .. } => self.pointer = Some(position),
                InputEvent::KeyDown(_) | InputEvent::KeyUp(_) => {}
            }
        }
    }

    /// Releases everything held, as if every key and button went up.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.keys = KeyStates::default();
        self.pointer_down = [false; 2];
        self.pointer_pressed = [false; 2];
        self.pointer_released = [false; 2];
    }

    pub fn is_down(&self, key: Key) -> bool {
        self.keys.down[key.index()]
    }

    pub fn just_pressed(&self, key: Key) -> bool {
        self.keys.pressed[key.index()]
    }

    pub fn just_released(&self, key: Key) -> bool {
        self.keys.released[key.index()]
    }

    pub fn pointer(&self) -> Option<Vec2> {
        self.pointer
    }

    pub fn pointer_is_down(&self, button: PointerButton) -> bool {
        self.pointer_down[button_index(button)]
    }

    pub fn pointer_just_pressed(&self, button: PointerButton) -> bool {
        self.pointer_pressed[button_index(button)]
    }

    pub fn pointer_just_released(&self, button: PointerButton) -> bool {
        self.pointer_released[button_index(button)]
    }

    fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::KeyDown(key) => {
                let index = key.index();
                if !self.keys.down[index] {
                    self.keys.pressed[index] = true;
                }
                self.keys.down[index] = true;
            }
            InputEvent::KeyUp(key) => {
                let index = key.index();
                if self.keys.down[index] {
                    self.keys.released[index] = true;
                }
                self.keys.down[index] = false;
            }
            InputEvent::PointerMove { position } => self.pointer = Some(position),
            InputEvent::PointerDown { position, button } => {
                let index = button_index(button);
                self.pointer = Some(position);
                if !self.pointer_down[index] {
                    self.pointer_pressed[index] = true;
                }
                self.pointer_down[index] = true;
            }
            InputEvent::PointerUp { position, button } => {
                let index = button_index(button);
                self.pointer = Some(position);
                if self.pointer_down[index] {
                    self.pointer_released[index] = true;
                }
                self.pointer_down[index] = false;
            }
        }
    }

    fn clear_edges(&mut self) {
        self.keys.pressed = [false; KEY_COUNT];
        self.keys.released = [false; KEY_COUNT];
        self.pointer_pressed = [false; 2];
        self.pointer_released = [false; 2];
    }
}

fn button_index(button: PointerButton) -> usize {
    match button {
        PointerButton::Primary => 0,
        PointerButton::Secondary => 1,
    }
}
