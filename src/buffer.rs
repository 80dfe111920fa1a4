// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame buffers and the producer/consumer frame exchange.
//!
//! The acquisition thread renders each scan into a private back buffer and
//! then swaps it with the published front buffer. The display loop only ever
//! copies the front buffer, so it never observes a frame that is still being
//! written.
//!
//! # Architecture
//!
//! ```text
//!  acquisition thread                 FrameExchange                display loop
//! ┌──────────────────┐          ┌──────────────────────┐      ┌────────────────┐
//! │ back: FrameBuffer│  publish │ Mutex<Slot>          │ read │ screen buffer  │
//! │  (rendering)     │ ───────► │   front: FrameBuffer │ ───► │  (blit 1:1)    │
//! │                  │ ◄─ swap  │   mouse: MouseState  │ ◄─── │  mouse sample  │
//! └──────────────────┘          │   sequence: u64      │      └────────────────┘
//!                               └──────────────────────┘
//! ```
//!
//! The lock is held only for the swap (plus the probe overlay, which needs the
//! mouse state) on the producer side and for the copy on the consumer side.
//!
//! # Example
//!
//! ```
//! use edgefirst_lidarview::buffer::{FrameBuffer, FrameExchange, rgba};
//! use edgefirst_lidarview::mouse::MouseState;
//!
//! let exchange = FrameExchange::new(4, 2);
//! let mut back = FrameBuffer::new(4, 2);
//! back.fill(rgba(10, 20, 30, 255));
//!
//! let seq = exchange.publish(&mut back, |_, _| {});
//! assert_eq!(seq, 1);
//!
//! let mut screen = FrameBuffer::new(4, 2);
//! exchange.read(MouseState::default(), |front, _| screen.blit(front, 0, 0));
//! assert_eq!(screen.get(3, 1), Some(rgba(10, 20, 30, 255)));
//! ```

use crate::mouse::MouseState;
use std::sync::{Mutex, MutexGuard};

/// Pack an RGBA8 color as `0xAARRGGBB`.
///
/// The low 24 bits match the `0x00RRGGBB` layout expected by the window.
#[inline]
pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Opaque gray pixel of the given intensity.
#[inline]
pub const fn gray(v: u8) -> u32 {
    rgba(v, v, v, 0xff)
}

/// Split a packed pixel into `[r, g, b, a]`.
#[inline]
pub const fn channels(pixel: u32) -> [u8; 4] {
    [
        (pixel >> 16) as u8,
        (pixel >> 8) as u8,
        pixel as u8,
        (pixel >> 24) as u8,
    ]
}

/// Width x height grid of packed RGBA8 pixels, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    pub width: usize,
    pub height: usize,
    pixels: Vec<u32>,
}

impl FrameBuffer {
    /// Allocate a transparent black buffer.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
        }
    }

    #[inline]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    pub fn get(&self, x: usize, y: usize) -> Option<u32> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Set a single pixel. Returns `false` without writing when `(x, y)` is
    /// outside the buffer.
    pub fn set(&mut self, x: usize, y: usize, pixel: u32) -> bool {
        match self.index(x, y) {
            Some(i) => {
                self.pixels[i] = pixel;
                true
            }
            None => false,
        }
    }

    pub fn fill(&mut self, pixel: u32) {
        self.pixels.fill(pixel);
    }

    /// Copy `src` into this buffer with its top-left corner at `(x, y)`,
    /// clipping whatever falls outside.
    pub fn blit(&mut self, src: &FrameBuffer, x: usize, y: usize) {
        if x >= self.width || y >= self.height {
            return;
        }

        let cols = src.width.min(self.width - x);
        let rows = src.height.min(self.height - y);
        for row in 0..rows {
            let d = (y + row) * self.width + x;
            let s = row * src.width;
            self.pixels[d..d + cols].copy_from_slice(&src.pixels[s..s + cols]);
        }
    }
}

struct Slot {
    front: FrameBuffer,
    mouse: MouseState,
    sequence: u64,
}

/// Single-slot frame exchange between one producer and one consumer.
///
/// Consumers always see the most recently published frame; a frame may be
/// read several times if nothing newer has been published.
pub struct FrameExchange {
    slot: Mutex<Slot>,
}

impl FrameExchange {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            slot: Mutex::new(Slot {
                front: FrameBuffer::new(width, height),
                mouse: MouseState::default(),
                sequence: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A panicking peer cannot leave a half-swapped slot behind.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish `back` as the new front buffer.
    ///
    /// `annotate` runs under the lock with the latest mouse state before the
    /// swap, so overlays land in the same frame. On return `back` holds the
    /// previous front buffer, ready to be overwritten. Returns the new frame
    /// sequence number.
    pub fn publish<F>(&self, back: &mut FrameBuffer, annotate: F) -> u64
    where
        F: FnOnce(&mut FrameBuffer, &MouseState),
    {
        let mut slot = self.lock();
        annotate(back, &slot.mouse);
        std::mem::swap(&mut slot.front, back);
        slot.sequence += 1;
        slot.sequence
    }

    /// Store the consumer's mouse state and read the front buffer.
    pub fn read<R, F>(&self, mouse: MouseState, f: F) -> R
    where
        F: FnOnce(&FrameBuffer, u64) -> R,
    {
        let mut slot = self.lock();
        slot.mouse = mouse;
        f(&slot.front, slot.sequence)
    }

    /// Number of frames published so far.
    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }

    /// Latest mouse state stored by the consumer.
    pub fn mouse(&self) -> MouseState {
        self.lock().mouse
    }
}
