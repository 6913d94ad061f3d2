//! Windowed rendering of fixed-height rows.
//!
//! A [`WindowedTable`] owns an ordered sequence of records but only keeps live
//! rows for the slice that intersects the viewport, plus `buffer_rows` above
//! and below. The surface it draws into is abstract: it hands out opaque row
//! handles and knows how tall the scrollable content is and where the
//! rendered block sits. The terminal tables implement it in `ui_utils`, tests
//! implement it in memory.

use std::collections::BTreeMap;
use std::ops::Range;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

/// Default coalescing interval for scroll and resize events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(16);

/// Row handle capability the engine renders through.
pub trait RowSurface {
    type Row;

    /// Whether the surface has the body rows attach to.
    fn has_body(&self) -> bool;

    fn viewport_height(&self) -> u32;

    fn create_row(&mut self) -> Self::Row;

    fn position_row(&mut self, row: &mut Self::Row, index: usize, top: u64);

    fn destroy_row(&mut self, row: Self::Row);

    /// Total logical height, so scrollbars reflect the full length.
    fn set_content_height(&mut self, height: u64);

    /// Offset of the rendered block inside the scrollable content.
    fn set_block_offset(&mut self, offset: u64);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub rows_rendered: u64,
    pub rows_created: u64,
    pub rows_destroyed: u64,
    pub reconciles: u64,
}

/// `[floor(top/h) - buffer, ceil((top+viewport)/h) + buffer)` clamped to `[0, len)`.
pub fn window_range(
    scroll_top: u64,
    viewport_height: u32,
    row_height: u32,
    buffer_rows: usize,
    len: usize,
) -> Range<usize> {
    let row_height = u64::from(row_height.max(1));
    let first = usize::try_from(scroll_top / row_height).unwrap_or(usize::MAX);
    let last = usize::try_from((scroll_top + u64::from(viewport_height)).div_ceil(row_height))
        .unwrap_or(usize::MAX);
    let start = first.saturating_sub(buffer_rows).min(len);
    let end = last.saturating_add(buffer_rows).min(len);
    start..end.max(start)
}

pub struct WindowedTable<S, T, F>
where
    S: RowSurface,
    F: FnMut(&mut S::Row, &T, usize),
{
    surface: S,
    row_height: u32,
    buffer_rows: usize,
    render_row: F,
    records: Vec<T>,
    live: BTreeMap<usize, S::Row>,
    window: Range<usize>,
    scroll_top: u64,
    viewport_height: u32,
    debounce: Duration,
    dirty: bool,
    last_reconcile: Option<Instant>,
    stats: RenderStats,
}

impl<S, T, F> WindowedTable<S, T, F>
where
    S: RowSurface,
    F: FnMut(&mut S::Row, &T, usize),
{
    /// Returns `None` when the surface has no body; the caller renders that
    /// table without virtualization (or not at all).
    pub fn initialize(mut surface: S, row_height: u32, buffer_rows: usize, render_row: F) -> Option<Self> {
        if !surface.has_body() {
            warn!("render surface has no body, skipping virtualization");
            return None;
        }
        let viewport_height = surface.viewport_height();
        surface.set_content_height(0);
        surface.set_block_offset(0);
        Some(Self {
            surface,
            row_height: row_height.max(1),
            buffer_rows,
            render_row,
            records: Vec::new(),
            live: BTreeMap::new(),
            window: 0..0,
            scroll_top: 0,
            viewport_height,
            debounce: DEFAULT_DEBOUNCE,
            dirty: false,
            last_reconcile: None,
            stats: RenderStats::default(),
        })
    }

    #[cfg(test)]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn row_height(&self) -> u32 {
        self.row_height
    }

    pub fn scroll_top(&self) -> u64 {
        self.scroll_top
    }

    pub fn viewport_height(&self) -> u32 {
        self.viewport_height
    }

    pub fn content_height(&self) -> u64 {
        self.records.len() as u64 * u64::from(self.row_height)
    }

    #[cfg(test)]
    pub fn window(&self) -> Range<usize> {
        self.window.clone()
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn live_rows(&self) -> impl Iterator<Item = (usize, &S::Row)> {
        self.live.iter().map(|(idx, row)| (*idx, row))
    }

    pub fn first_visible_index(&self) -> usize {
        (self.scroll_top / u64::from(self.row_height)) as usize
    }

    /// Whole rows in the viewport, at least one.
    pub fn rows_per_viewport(&self) -> usize {
        (self.viewport_height / self.row_height).max(1) as usize
    }

    fn max_scroll(&self) -> u64 {
        self.content_height()
            .saturating_sub(u64::from(self.viewport_height))
    }

    fn target_range(&self) -> Range<usize> {
        window_range(
            self.scroll_top,
            self.viewport_height,
            self.row_height,
            self.buffer_rows,
            self.records.len(),
        )
    }

    /// Full replace. Keeps the scroll position (clamped to the new length)
    /// and repaints only the window.
    pub fn set_data(&mut self, records: Vec<T>) {
        self.records = records;
        self.surface.set_content_height(self.content_height());
        self.scroll_top = self.scroll_top.min(self.max_scroll());
        self.reconcile(true);
    }

    /// Grows the sequence; only appended rows that land in the window render.
    pub fn append_data(&mut self, records: Vec<T>) {
        if records.is_empty() {
            return;
        }
        let old_len = self.records.len();
        self.records.extend(records);
        self.surface.set_content_height(self.content_height());
        let target = self.target_range();
        if target.end > old_len {
            self.reconcile(false);
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        for (_, row) in std::mem::take(&mut self.live) {
            self.surface.destroy_row(row);
            self.stats.rows_destroyed += 1;
        }
        self.window = 0..0;
        self.scroll_top = 0;
        self.dirty = false;
        self.surface.set_content_height(0);
        self.surface.set_block_offset(0);
    }

    pub fn on_scroll(&mut self, scroll_top: u64) {
        self.scroll_top = scroll_top.min(self.max_scroll());
        self.dirty = true;
    }

    pub fn on_resize(&mut self, viewport_height: u32) {
        if viewport_height != self.viewport_height {
            self.viewport_height = viewport_height;
            self.scroll_top = self.scroll_top.min(self.max_scroll());
            self.dirty = true;
        }
    }

    pub fn scroll_by_rows(&mut self, delta: i64) {
        let step = delta.unsigned_abs().saturating_mul(u64::from(self.row_height));
        let top = if delta < 0 {
            self.scroll_top.saturating_sub(step)
        } else {
            self.scroll_top.saturating_add(step)
        };
        self.on_scroll(top);
    }

    /// Scrolls the minimum amount needed for `index` to be fully visible.
    pub fn scroll_into_view(&mut self, index: usize) {
        let row_height = u64::from(self.row_height);
        let top = index as u64 * row_height;
        let bottom = top + row_height;
        let viewport = u64::from(self.viewport_height);
        if top < self.scroll_top {
            self.on_scroll(top);
        } else if bottom > self.scroll_top + viewport {
            self.on_scroll(bottom.saturating_sub(viewport));
        }
    }

    /// Runs a pending scroll/resize reconcile unless one ran within the
    /// debounce interval. Returns whether a reconcile happened.
    pub fn pump(&mut self, now: Instant) -> bool {
        if !self.dirty {
            return false;
        }
        if let Some(last) = self.last_reconcile
            && now.saturating_duration_since(last) < self.debounce
        {
            return false;
        }
        self.reconcile(false);
        self.last_reconcile = Some(now);
        true
    }

    /// Brings live rows to exactly the target range. Rows that stay keep their
    /// content unless `rerender` is set; rows that leave are recycled for rows
    /// that enter, and only the surplus or deficit is destroyed or created.
    fn reconcile(&mut self, rerender: bool) {
        let target = self.target_range();
        let row_height = u64::from(self.row_height);

        let leaving = self
            .live
            .keys()
            .filter(|idx| !target.contains(idx))
            .copied()
            .collect::<Vec<_>>();
        let mut spare = leaving
            .into_iter()
            .filter_map(|idx| self.live.remove(&idx))
            .collect::<Vec<_>>();

        for index in target.clone() {
            if let Some(row) = self.live.get_mut(&index) {
                if rerender {
                    (self.render_row)(row, &self.records[index], index);
                    self.stats.rows_rendered += 1;
                }
                continue;
            }
            let mut row = match spare.pop() {
                Some(row) => row,
                None => {
                    self.stats.rows_created += 1;
                    self.surface.create_row()
                }
            };
            self.surface
                .position_row(&mut row, index, index as u64 * row_height);
            (self.render_row)(&mut row, &self.records[index], index);
            self.stats.rows_rendered += 1;
            self.live.insert(index, row);
        }

        for row in spare {
            self.surface.destroy_row(row);
            self.stats.rows_destroyed += 1;
        }

        self.surface.set_block_offset(target.start as u64 * row_height);
        trace!(start = target.start, end = target.end, "window reconciled");
        self.window = target;
        self.dirty = false;
        self.stats.reconciles += 1;
    }
}

/// Record-type-erased handle so callers can drive any table the same way.
pub trait TableView<R> {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;
    fn scroll_top(&self) -> u64;
    fn viewport_height(&self) -> u32;
    fn row_height(&self) -> u32;
    fn first_visible_index(&self) -> usize;
    fn rows_per_viewport(&self) -> usize;
    fn stats(&self) -> RenderStats;
    fn live_rows(&self) -> Vec<(usize, &R)>;
    fn scroll_by_rows(&mut self, delta: i64);
    fn scroll_into_view(&mut self, index: usize);
    fn on_resize(&mut self, viewport_height: u32);
    fn pump(&mut self, now: Instant) -> bool;
}

impl<S, T, F> TableView<S::Row> for WindowedTable<S, T, F>
where
    S: RowSurface,
    F: FnMut(&mut S::Row, &T, usize),
{
    fn len(&self) -> usize {
        WindowedTable::len(self)
    }

    fn is_empty(&self) -> bool {
        WindowedTable::is_empty(self)
    }

    fn scroll_top(&self) -> u64 {
        WindowedTable::scroll_top(self)
    }

    fn viewport_height(&self) -> u32 {
        WindowedTable::viewport_height(self)
    }

    fn row_height(&self) -> u32 {
        WindowedTable::row_height(self)
    }

    fn first_visible_index(&self) -> usize {
        WindowedTable::first_visible_index(self)
    }

    fn rows_per_viewport(&self) -> usize {
        WindowedTable::rows_per_viewport(self)
    }

    fn stats(&self) -> RenderStats {
        WindowedTable::stats(self)
    }

    fn live_rows(&self) -> Vec<(usize, &S::Row)> {
        WindowedTable::live_rows(self).collect()
    }

    fn scroll_by_rows(&mut self, delta: i64) {
        WindowedTable::scroll_by_rows(self, delta);
    }

    fn scroll_into_view(&mut self, index: usize) {
        WindowedTable::scroll_into_view(self, index);
    }

    fn on_resize(&mut self, viewport_height: u32) {
        WindowedTable::on_resize(self, viewport_height);
    }

    fn pump(&mut self, now: Instant) -> bool {
        WindowedTable::pump(self, now)
    }
}
