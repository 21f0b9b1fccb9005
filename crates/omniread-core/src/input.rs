//! Key bindings and cross-scope key routing.
//!
//! The reader receives key events from two scopes: the render surface and the
//! surrounding window. Both feed one `InputRouter`, which maps presses to
//! actions and drops the echo when the same press arrives from both scopes.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    NextPage,
    PrevPage,
    ToggleToc,
    CycleLayout,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputScope {
    Surface,
    Window,
}

impl InputScope {
    fn other(self) -> Self {
        match self {
            InputScope::Surface => InputScope::Window,
            InputScope::Window => InputScope::Surface,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub logo: bool,
    pub shift: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    /// Lowercased key name, e.g. `"right"`, `"space"`, `"t"`.
    pub key: String,
    pub modifiers: Modifiers,
}

impl KeyPress {
    pub fn plain(key: &str) -> Self {
        Self {
            key: key.trim().to_ascii_lowercase(),
            modifiers: Modifiers::default(),
        }
    }

    /// Parse a chord such as `ctrl+f` or `Right`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize_shortcut_token(raw, "");
        let mut modifiers = Modifiers::default();
        let mut key = None;
        for token in normalized
            .split('+')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            match token {
                "ctrl" | "control" => modifiers.ctrl = true,
                "alt" => modifiers.alt = true,
                "logo" | "meta" | "super" | "cmd" | "command" => modifiers.logo = true,
                "shift" => modifiers.shift = true,
                other => key = Some(other.to_string()),
            }
        }
        Some(Self {
            key: key?,
            modifiers,
        })
    }
}

pub fn shortcut_matches(raw: &str, fallback: &str, pressed: &KeyPress) -> bool {
    let normalized = normalize_shortcut_token(raw, fallback);

    let mut required = Modifiers::default();
    let mut required_key: Option<&str> = None;

    for token in normalized
        .split('+')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        match token {
            "ctrl" | "control" => required.ctrl = true,
            "alt" => required.alt = true,
            "logo" | "meta" | "super" | "cmd" | "command" => required.logo = true,
            "shift" => required.shift = true,
            key => required_key = Some(key),
        }
    }

    let required_key = required_key.unwrap_or(fallback);
    pressed.key == required_key && pressed.modifiers == required
}

pub fn normalize_shortcut_token(raw: &str, fallback: &str) -> String {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        fallback.to_string()
    } else {
        normalized
            .replace("spacebar", "space")
            .replace("arrowright", "right")
            .replace("arrowleft", "left")
    }
}

/// Configured chord for each action, with the built-in key as fallback.
#[derive(Debug, Clone)]
pub struct Keymap {
    bindings: Vec<(KeyAction, String, &'static str)>,
}

impl Keymap {
    pub fn new(
        next_page: &str,
        prev_page: &str,
        toggle_toc: &str,
        cycle_layout: &str,
        close: &str,
    ) -> Self {
        Self {
            bindings: vec![
                (KeyAction::NextPage, next_page.to_string(), "right"),
                (KeyAction::PrevPage, prev_page.to_string(), "left"),
                (KeyAction::ToggleToc, toggle_toc.to_string(), "t"),
                (KeyAction::CycleLayout, cycle_layout.to_string(), "m"),
                (KeyAction::Close, close.to_string(), "q"),
            ],
        }
    }

    pub fn resolve(&self, press: &KeyPress) -> Option<KeyAction> {
        self.bindings
            .iter()
            .find(|(_, raw, fallback)| shortcut_matches(raw, fallback, press))
            .map(|(action, _, _)| *action)
    }
}

impl Default for Keymap {
    fn default() -> Self {
        Self::new("right", "left", "t", "m", "q")
    }
}

pub struct InputRouter {
    keymap: Keymap,
    focus: InputScope,
    debounce: Duration,
    last_dispatch: HashMap<(KeyAction, InputScope), Instant>,
}

impl InputRouter {
    pub fn new(keymap: Keymap, debounce: Duration) -> Self {
        Self {
            keymap,
            focus: InputScope::Window,
            debounce,
            last_dispatch: HashMap::new(),
        }
    }

    pub fn focus(&self) -> InputScope {
        self.focus
    }

    pub fn set_focus(&mut self, scope: InputScope) {
        self.focus = scope;
    }

    fn dispatched_within(&self, action: KeyAction, scope: InputScope, at: Instant) -> bool {
        self.last_dispatch
            .get(&(action, scope))
            .is_some_and(|last| at.saturating_duration_since(*last) < self.debounce)
    }

    /// Map a press to an action, or `None` when it is unbound or an echo of
    /// a press already dispatched from the other scope.
    pub fn route(&mut self, scope: InputScope, press: &KeyPress, at: Instant) -> Option<KeyAction> {
        let action = self.keymap.resolve(press)?;
        let echo = if scope == self.focus {
            self.dispatched_within(action, scope.other(), at)
        } else {
            self.dispatched_within(action, scope, at)
                || self.dispatched_within(action, scope.other(), at)
        };
        if echo {
            trace!(?action, ?scope, "Dropped duplicate key press");
            return None;
        }
        self.last_dispatch.insert((action, scope), at);
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctrl(key: &str) -> KeyPress {
        KeyPress {
            key: key.to_string(),
            modifiers: Modifiers {
                ctrl: true,
                ..Modifiers::default()
            },
        }
    }

    #[test]
    fn normalizes_spacebar_alias() {
        assert_eq!(normalize_shortcut_token(" SpaceBar ", "x"), "space");
        assert_eq!(normalize_shortcut_token("  ", "right"), "right");
    }

    #[test]
    fn matches_ctrl_f_shortcut() {
        assert!(shortcut_matches("ctrl+f", "x", &ctrl("f")));
    }

    #[test]
    fn rejects_unexpected_extra_modifier() {
        let mut press = ctrl("f");
        press.modifiers.shift = true;
        assert!(!shortcut_matches("ctrl+f", "x", &press));
    }

    #[test]
    fn keymap_falls_back_for_blank_bindings() {
        let keymap = Keymap::new("", "ctrl+b", "t", "m", "q");
        assert_eq!(keymap.resolve(&KeyPress::plain("Right")), Some(KeyAction::NextPage));
        assert_eq!(keymap.resolve(&ctrl("b")), Some(KeyAction::PrevPage));
        assert_eq!(keymap.resolve(&KeyPress::plain("left")), None);
        assert_eq!(KeyPress::parse("Ctrl+B"), Some(ctrl("b")));
        assert_eq!(KeyPress::parse("ctrl+"), None);
    }

    #[test]
    fn echo_from_other_scope_is_dropped() {
        let mut router = InputRouter::new(Keymap::default(), Duration::from_millis(150));
        router.set_focus(InputScope::Surface);
        let t0 = Instant::now();
        let right = KeyPress::plain("right");

        assert_eq!(router.route(InputScope::Surface, &right, t0), Some(KeyAction::NextPage));
        assert_eq!(router.route(InputScope::Window, &right, t0 + Duration::from_millis(5)), None);
        assert_eq!(
            router.route(InputScope::Window, &right, t0 + Duration::from_millis(400)),
            Some(KeyAction::NextPage)
        );
    }

    #[test]
    fn rapid_presses_in_focused_scope_all_dispatch() {
        let mut router = InputRouter::new(Keymap::default(), Duration::from_millis(150));
        router.set_focus(InputScope::Window);
        let t0 = Instant::now();
        let right = KeyPress::plain("right");
        for step in 0..4 {
            assert_eq!(
                router.route(InputScope::Window, &right, t0 + Duration::from_millis(step * 10)),
                Some(KeyAction::NextPage)
            );
        }
        assert_eq!(router.route(InputScope::Surface, &right, t0 + Duration::from_millis(35)), None);
    }

    #[test]
    fn focused_scope_drops_echo_of_unfocused_dispatch() {
        let mut router = InputRouter::new(Keymap::default(), Duration::from_millis(150));
        router.set_focus(InputScope::Surface);
        let t0 = Instant::now();
        let left = KeyPress::plain("left");
        assert_eq!(router.route(InputScope::Window, &left, t0), Some(KeyAction::PrevPage));
        assert_eq!(router.route(InputScope::Surface, &left, t0 + Duration::from_millis(3)), None);
    }
}
