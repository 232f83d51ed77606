//! Live window arithmetic for mxsync timelines.
//!
//! A live window is a contiguous range of positions ending at the tail of a
//! stream. It follows the tail forward as events are appended (keeping its
//! length) and grows backward by one page on each "load more". The length is
//! capped so a long-lived window never holds an unbounded number of events.

use mxsync_types::Position;

/// Sizing parameters for a live window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    /// Number of events visible right after binding.
    pub initial: usize,
    /// Number of events added by each "load more".
    pub page_size: usize,
    /// Hard cap on the window length.
    pub max: usize,
}

impl WindowSpec {
    /// Create a spec. All values are clamped to at least 1, and `initial`
    /// to at most `max`.
    pub fn new(initial: usize, page_size: usize, max: usize) -> Self {
        let max = max.max(1);
        Self {
            initial: initial.clamp(1, max),
            page_size: page_size.max(1),
            max,
        }
    }
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self::new(20, 20, 500)
    }
}

/// Inclusive range of positions covered by a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRange {
    /// First (oldest) visible position.
    pub start: Position,
    /// Last (newest) visible position.
    pub end: Position,
}

impl WindowRange {
    /// Number of positions in the range.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        (self.end.value() - self.start.value() + 1) as usize
    }

    /// Check if the range holds no positions.
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Check if a position lies inside the range.
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }
}

/// Tail-following window over one stream.
#[derive(Debug, Clone)]
pub struct LiveWindow {
    spec: WindowSpec,
    len: usize,
}

impl LiveWindow {
    /// Create a window with the spec's initial length.
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            len: spec.initial,
            spec,
        }
    }

    /// Target window length.
    pub fn target_len(&self) -> usize {
        self.len
    }

    /// Sizing parameters.
    pub fn spec(&self) -> WindowSpec {
        self.spec
    }

    /// Visible range for a stream whose newest event is at `tail`.
    ///
    /// Returns `None` for an empty stream.
    pub fn range(&self, tail: Position) -> Option<WindowRange> {
        if tail == Position::zero() {
            return None;
        }
        let end = tail.value();
        let start = end.saturating_sub(self.len as u64 - 1).max(1);
        Some(WindowRange {
            start: Position::new(start),
            end: Position::new(end),
        })
    }

    /// Check if older events exist before the visible range.
    pub fn has_more_backward(&self, tail: Position) -> bool {
        self.range(tail)
            .map(|r| r.start.value() > 1)
            .unwrap_or(false)
    }

    /// Extend the window backward by one page.
    ///
    /// Returns `true` if the visible range grew. Growth stops at the first
    /// event of the stream and at the spec's `max`.
    pub fn load_more(&mut self, tail: Position) -> bool {
        if !self.has_more_backward(tail) || self.len >= self.spec.max {
            return false;
        }
        let available = tail.value().min(usize::MAX as u64) as usize;
        self.len = (self.len + self.spec.page_size)
            .min(self.spec.max)
            .min(available);
        true
    }

    /// Check if an append ending at `new_tail` changes what this window shows.
    ///
    /// Every append past `old_tail` moves a tail-following window.
    pub fn affected_by_append(&self, old_tail: Position, new_tail: Position) -> bool {
        new_tail > old_tail
    }
}
