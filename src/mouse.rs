// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Mouse button and cursor snapshot.

/// Mouse state sampled once per display iteration.
///
/// Coordinates are in frame buffer pixels; `-1` means the cursor is outside
/// the window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MouseState {
    /// Left button held
    pub down: bool,
    /// Button went down since the previous sample
    pub pressed: bool,
    /// Button went up since the previous sample
    pub released: bool,
    pub x: i32,
    pub y: i32,
}

impl Default for MouseState {
    fn default() -> Self {
        Self {
            down: false,
            pressed: false,
            released: false,
            x: -1,
            y: -1,
        }
    }
}

impl MouseState {
    /// Derive the next snapshot from the previous one and raw input.
    pub fn next(previous: &MouseState, down: bool, position: Option<(f32, f32)>) -> MouseState {
        let (x, y) = match position {
            Some((x, y)) if x >= 0.0 && y >= 0.0 => (x as i32, y as i32),
            _ => (-1, -1),
        };

        MouseState {
            down,
            pressed: down && !previous.down,
            released: !down && previous.down,
            x,
            y,
        }
    }

    /// Cursor position when inside a `width x height` area.
    pub fn position_in(&self, width: usize, height: usize) -> Option<(usize, usize)> {
        if self.x < 0 || self.y < 0 {
            return None;
        }

        let (x, y) = (self.x as usize, self.y as usize);
        (x < width && y < height).then_some((x, y))
    }
}
