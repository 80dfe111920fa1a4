// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Range image window.
//!
//! The display loop owns the window and runs on the main thread. Each
//! iteration it samples the mouse into the [`FrameExchange`], clears the
//! screen to [`BACKGROUND`], copies the latest published frame to the top-left
//! corner and presents it.

use crate::{
    buffer::{FrameBuffer, FrameExchange, rgba},
    lidar::Error,
    mouse::MouseState,
};
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};
use tracing::{debug, trace};

/// Screen color around and behind the range image.
pub const BACKGROUND: u32 = rgba(0x80, 0x90, 0xa0, 0xff);

pub struct Display {
    window: Window,
    screen: FrameBuffer,
}

impl Display {
    /// Open a `width x height` window.
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self, Error> {
        let window = Window::new(title, width, height, WindowOptions::default())
            .map_err(|e| Error::Window(e.to_string()))?;
        Ok(Self {
            window,
            screen: FrameBuffer::new(width, height),
        })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    /// True once `q` or Escape was pressed.
    pub fn exit_requested(&self) -> bool {
        self.window
            .get_keys_pressed(KeyRepeat::No)
            .iter()
            .any(|key| matches!(key, Key::Q | Key::Escape))
    }

    /// Sample the left button and cursor.
    pub fn mouse(&self, previous: &MouseState) -> MouseState {
        MouseState::next(
            previous,
            self.window.get_mouse_down(MouseButton::Left),
            self.window.get_mouse_pos(MouseMode::Discard),
        )
    }

    /// Push the screen buffer to the window.
    pub fn present(&mut self) -> Result<(), Error> {
        self.window
            .update_with_buffer(self.screen.pixels(), self.screen.width, self.screen.height)
            .map_err(|e| Error::Window(e.to_string()))
    }

    /// Run until the window is closed, exit is requested or `running`
    /// returns false.
    pub fn run<F>(&mut self, exchange: &FrameExchange, running: F) -> Result<(), Error>
    where
        F: Fn() -> bool,
    {
        let mut mouse = MouseState::default();
        let mut shown = 0;

        while running() && self.is_open() && !self.exit_requested() {
            mouse = self.mouse(&mouse);
            if mouse.pressed {
                trace!("mouse pressed at {} {}", mouse.x, mouse.y);
            }

            self.screen.fill(BACKGROUND);
            let screen = &mut self.screen;
            shown = exchange.read(mouse, |front, seq| {
                screen.blit(front, 0, 0);
                seq
            });
            self.present()?;
        }

        debug!("display closed after frame {}", shown);
        Ok(())
    }
}
