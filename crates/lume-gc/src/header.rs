//! Per-object color and flag state.
//!
//! Every collectable carries a [`GcHeader`]: a tri-color mark plus a small
//! set of flags. White comes in two flavors that alternate between cycles,
//! so that objects created while a sweep is in progress are never mistaken
//! for garbage of the cycle being swept.
//!
//! Color changes go through named transitions. In debug builds each one
//! asserts its precondition, so an illegal move (black straight back to
//! white outside a sweep, recoloring a fixed object, ...) fails loudly at
//! the offending call instead of surfacing later as a use-after-free.

use bitflags::bitflags;

/// One of the two alternating white generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum White {
    /// First white generation.
    Zero,
    /// Second white generation.
    One,
}

impl White {
    /// The other white generation.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }
}

/// Reachability color of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// Not yet reached in the current cycle.
    White(White),
    /// Reached, children not yet scanned.
    Gray,
    /// Reached and fully scanned.
    Black,
}

bitflags! {
    /// Type-specific object flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GcFlags: u8 {
        /// Userdata: already separated for finalization once.
        const FINALIZED = 1 << 0;
        /// Table: keys are weak (set from `__mode` during traversal).
        const WEAK_KEYS = 1 << 1;
        /// Table: values are weak (set from `__mode` during traversal).
        const WEAK_VALUES = 1 << 2;
        /// Never collected; color is pinned to black.
        const FIXED = 1 << 3;
    }
}

/// Color and flags of one collectable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcHeader {
    color: Color,
    flags: GcFlags,
}

impl GcHeader {
    /// Header of a freshly allocated object.
    #[must_use]
    pub const fn new(white: White) -> Self {
        Self {
            color: Color::White(white),
            flags: GcFlags::empty(),
        }
    }

    /// Current color.
    #[must_use]
    pub const fn color(&self) -> Color {
        self.color
    }

    /// Current flags.
    #[must_use]
    pub const fn flags(&self) -> GcFlags {
        self.flags
    }

    /// Either white.
    #[must_use]
    pub const fn is_white(&self) -> bool {
        matches!(self.color, Color::White(_))
    }

    #[must_use]
    pub const fn is_gray(&self) -> bool {
        matches!(self.color, Color::Gray)
    }

    #[must_use]
    pub const fn is_black(&self) -> bool {
        matches!(self.color, Color::Black)
    }

    #[must_use]
    pub const fn is_fixed(&self) -> bool {
        self.flags.contains(GcFlags::FIXED)
    }

    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.flags.contains(GcFlags::FINALIZED)
    }

    /// Carries the white that is *not* `current`, i.e. it was not reached
    /// before the last flip and is waiting to be swept.
    #[must_use]
    pub fn is_dead(&self, current: White) -> bool {
        self.color == Color::White(current.other())
    }

    /// White to gray: the object has been reached.
    pub fn white_to_gray(&mut self) {
        debug_assert!(self.is_white(), "white_to_gray on {:?}", self.color);
        debug_assert!(!self.is_fixed(), "fixed objects are never recolored");
        self.color = Color::Gray;
    }

    /// Gray to black: the object's children have been scanned.
    pub fn gray_to_black(&mut self) {
        debug_assert!(self.is_gray(), "gray_to_black on {:?}", self.color);
        self.color = Color::Black;
    }

    /// Black back to gray, for the backward barrier and for objects that
    /// must be revisited in the atomic pass.
    pub fn black_to_gray(&mut self) {
        debug_assert!(self.is_black(), "black_to_gray on {:?}", self.color);
        debug_assert!(!self.is_fixed(), "fixed objects are never recolored");
        self.color = Color::Gray;
    }

    /// Reset to the current white. Only the sweeper and the forward barrier
    /// (while sweeping) may do this; fixed objects keep their color.
    pub fn make_white(&mut self, current: White) {
        debug_assert!(!self.is_fixed(), "fixed objects are never recolored");
        self.color = Color::White(current);
    }

    /// Flip between the two whites. Used to revive a dead interned string.
    pub fn change_white(&mut self) {
        match self.color {
            Color::White(w) => self.color = Color::White(w.other()),
            other => debug_assert!(false, "change_white on {other:?}"),
        }
    }

    /// Pin the object: black forever, skipped by the sweeper.
    pub fn fix(&mut self) {
        self.flags.insert(GcFlags::FIXED);
        self.color = Color::Black;
    }

    pub fn set_finalized(&mut self) {
        self.flags.insert(GcFlags::FINALIZED);
    }

    /// Record the weakness found in a table's metatable.
    pub fn set_weakness(&mut self, weak_keys: bool, weak_values: bool) {
        self.flags.remove(GcFlags::WEAK_KEYS | GcFlags::WEAK_VALUES);
        self.flags.set(GcFlags::WEAK_KEYS, weak_keys);
        self.flags.set(GcFlags::WEAK_VALUES, weak_values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_object_is_current_white() {
        let h = GcHeader::new(White::One);
        assert!(h.is_white());
        assert!(!h.is_dead(White::One));
        assert!(h.is_dead(White::Zero));
    }

    #[test]
    fn mark_cycle() {
        let mut h = GcHeader::new(White::Zero);
        h.white_to_gray();
        assert!(h.is_gray());
        h.gray_to_black();
        assert!(h.is_black());
        h.black_to_gray();
        assert!(h.is_gray());
        h.gray_to_black();
        h.make_white(White::One);
        assert_eq!(h.color(), Color::White(White::One));
    }

    #[test]
    fn change_white_revives() {
        let mut h = GcHeader::new(White::Zero);
        assert!(h.is_dead(White::One));
        h.change_white();
        assert!(!h.is_dead(White::One));
    }

    #[test]
    fn fixed_is_black_and_flagged() {
        let mut h = GcHeader::new(White::Zero);
        h.fix();
        assert!(h.is_black());
        assert!(h.is_fixed());
        assert!(!h.is_dead(White::One));
    }

    #[test]
    fn weakness_replaces_previous_mode() {
        let mut h = GcHeader::new(White::Zero);
        h.set_weakness(true, true);
        h.set_weakness(false, true);
        assert!(!h.flags().contains(GcFlags::WEAK_KEYS));
        assert!(h.flags().contains(GcFlags::WEAK_VALUES));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "gray_to_black")]
    fn white_cannot_skip_gray() {
        let mut h = GcHeader::new(White::Zero);
        h.gray_to_black();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "never recolored")]
    fn fixed_cannot_be_whitened() {
        let mut h = GcHeader::new(White::Zero);
        h.fix();
        h.make_white(White::One);
    }
}
