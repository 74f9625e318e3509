//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod lru_cache;
pub mod ring_buffer;

pub use lru_cache::{CacheStats, LruCache};
pub use ring_buffer::{RingBuffer, RingBufferStats};
