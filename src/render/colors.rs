//! Color definitions for the text renderer.

/// RGB color applied through the colored crate's truecolor support.
#[derive(Clone, Copy, Debug)]
pub struct ThemeColor(pub u8, pub u8, pub u8);

impl ThemeColor {
    /// Get RGB tuple for use with colored crate's truecolor method.
    pub fn rgb(&self) -> (u8, u8, u8) {
        (self.0, self.1, self.2)
    }
}

pub mod theme {
    use super::ThemeColor;

    /// The checked-out branch.
    pub const GREEN: ThemeColor = ThemeColor(142, 192, 124);
    /// Branches that could not be placed.
    pub const RED: ThemeColor = ThemeColor(204, 36, 29);
    /// Abbreviated tip ids.
    pub const GOLD: ThemeColor = ThemeColor(215, 153, 33);
    /// Connectors and continuation bars.
    pub const TREE: ThemeColor = ThemeColor(100, 105, 105);
}
