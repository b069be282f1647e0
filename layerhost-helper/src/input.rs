//! Keyboard state: xkb context, the compositor-supplied keymap, and the
//! modifier tracking needed to turn raw evdev codes into keysyms.

use std::fs::File;
use std::os::fd::OwnedFd;

use memmap2::MmapOptions;
use tracing::{debug, warn};
use xkbcommon::xkb;

use layerhost_common::mods;

pub struct KeyboardState {
    context: xkb::Context,
    keymap: Option<xkb::Keymap>,
    state: Option<xkb::State>,
}

impl KeyboardState {
    pub fn new() -> Self {
        KeyboardState {
            context: xkb::Context::new(xkb::CONTEXT_NO_FLAGS),
            keymap: None,
            state: None,
        }
    }

    /// Compile the keymap the compositor handed us (xkb text format v1) and
    /// swap out whatever was there before. The mapping of the fd is released
    /// as soon as compilation finishes.
    pub fn load_keymap(&mut self, fd: OwnedFd, size: u32) {
        let file = File::from(fd);
        let map = match unsafe { MmapOptions::new().len(size as usize).map_copy_read_only(&file) } {
            Ok(map) => map,
            Err(e) => {
                warn!("cannot map keymap fd: {e}");
                return;
            }
        };
        // The compositor's keymap string is NUL-terminated.
        let text_len = map.iter().position(|&b| b == 0).unwrap_or(map.len());
        let Ok(text) = std::str::from_utf8(&map[..text_len]) else {
            warn!("keymap is not valid utf-8; keeping previous keymap");
            return;
        };
        let compiled = xkb::Keymap::new_from_string(
            &self.context,
            text.to_owned(),
            xkb::KEYMAP_FORMAT_TEXT_V1,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        );
        drop(map);

        match compiled {
            Some(keymap) => {
                self.state = Some(xkb::State::new(&keymap));
                let replaced = self.keymap.replace(keymap).is_some();
                debug!("keymap compiled ({text_len} bytes, replaced={replaced})");
            }
            None => warn!("keymap failed to compile; keeping previous keymap"),
        }
    }

    pub fn update_modifiers(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        if let Some(state) = self.state.as_mut() {
            state.update_mask(depressed, latched, locked, 0, 0, group);
        }
    }

    /// Resolve an evdev keycode to (keysym, modifier bitmask). Wayland
    /// keycodes are evdev codes; the matching xkb keycode sits 8 above.
    pub fn resolve(&self, evdev_code: u32) -> (u32, u32) {
        match self.state.as_ref() {
            Some(state) => {
                let sym = state.key_get_one_sym(xkb::Keycode::new(evdev_code + 8));
                (sym.raw(), modifier_bits(state))
            }
            None => (0, 0),
        }
    }
}

/// Effective modifiers folded into the 4-bit mask clients receive.
fn modifier_bits(state: &xkb::State) -> u32 {
    let mut bits = 0;
    if state.mod_name_is_active(xkb::MOD_NAME_SHIFT, xkb::STATE_MODS_EFFECTIVE) {
        bits |= mods::SHIFT;
    }
    if state.mod_name_is_active(xkb::MOD_NAME_CTRL, xkb::STATE_MODS_EFFECTIVE) {
        bits |= mods::CTRL;
    }
    if state.mod_name_is_active(xkb::MOD_NAME_ALT, xkb::STATE_MODS_EFFECTIVE) {
        bits |= mods::ALT;
    }
    if state.mod_name_is_active(xkb::MOD_NAME_LOGO, xkb::STATE_MODS_EFFECTIVE) {
        bits |= mods::LOGO;
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us_keyboard() -> KeyboardState {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_names(
            &context,
            "",
            "",
            "us",
            "",
            None,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .expect("compile us keymap");
        let state = xkb::State::new(&keymap);
        KeyboardState { context, keymap: Some(keymap), state: Some(state) }
    }

    #[test]
    fn shifted_a_resolves_keysym_and_modifier_mask() {
        let mut kb = us_keyboard();
        // evdev 42 = LeftShift, evdev 30 = A
        let _ = kb
            .state
            .as_mut()
            .unwrap()
            .update_key(xkb::Keycode::new(42 + 8), xkb::KeyDirection::Down);
        let (keysym, modifiers) = kb.resolve(30);
        assert_eq!(keysym, 0x41);
        assert_eq!(modifiers, mods::SHIFT);
    }

    #[test]
    fn unshifted_a_is_lowercase_with_no_modifiers() {
        let kb = us_keyboard();
        let (keysym, modifiers) = kb.resolve(30);
        assert_eq!(keysym, 0x61);
        assert_eq!(modifiers, 0);
    }

    #[test]
    fn keys_resolve_to_nothing_before_a_keymap_arrives() {
        let kb = KeyboardState::new();
        assert_eq!(kb.resolve(30), (0, 0));
    }
}
