//! Event buffering and the flush threshold.
//!
//! Summaries accumulate on a [`Timeline`] until the span between the first
//! buffered start tick and the latest observed end tick exceeds
//! [`FLUSH_WINDOW`]. Draining the buffer hands the summaries to the
//! translator and advances the watermark; the asynchronous side of a flush
//! (snapshot refresh, dispatch) lives in [`crate::bridge`].

use sillyworld_types::{EventSummary, Locale};
use tracing::{debug, warn};

use crate::timeline::Timeline;
use crate::translate::EventTranslator;

/// Ticks in one in-game hour.
pub const TICKS_PER_HOUR: u64 = 2500;

/// Span after which a buffer is flushed: four hours minus a small margin so
/// that summaries arriving on the hour reliably cross it.
pub const FLUSH_WINDOW: u64 = 4 * TICKS_PER_HOUR - 100;

/// Result of [`append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The summary was buffered.
    Buffered {
        /// Whether the flush threshold is now crossed.
        should_flush: bool,
    },
    /// The summary ended at or before the watermark and was dropped.
    Stale,
    /// The summary's end tick precedes its start tick.
    Malformed,
}

/// Whether the buffer must be flushed given the latest observed end tick.
pub fn should_flush(timeline: &Timeline, observed_end: u64) -> bool {
    timeline
        .buffer()
        .first()
        .is_some_and(|first| observed_end.saturating_sub(first.start_tick) > FLUSH_WINDOW)
}

/// Append a summary to the timeline's buffer.
///
/// Summaries that would violate the buffer invariant (end tick at or
/// below the watermark) or have an inverted window are rejected.
pub fn append(timeline: &mut Timeline, summary: EventSummary) -> AppendOutcome {
    if !summary.is_well_formed() {
        warn!(
            timeline_id = %timeline.id(),
            start = summary.start_tick,
            end = summary.end_tick,
            "dropping summary with inverted window"
        );
        return AppendOutcome::Malformed;
    }
    if summary.end_tick <= timeline.watermark() {
        debug!(
            timeline_id = %timeline.id(),
            end = summary.end_tick,
            watermark = timeline.watermark(),
            "dropping summary already accounted for"
        );
        return AppendOutcome::Stale;
    }
    let observed_end = summary.end_tick;
    if summary.malformed_events > 0 {
        warn!(
            timeline_id = %timeline.id(),
            dropped = summary.malformed_events,
            "summary carried undecodable events"
        );
    }
    timeline.buffer_mut().push(summary);
    AppendOutcome::Buffered {
        should_flush: should_flush(timeline, observed_end),
    }
}

/// Tick a manual flush advances the watermark to: the largest buffered end
/// tick, or `None` for an empty buffer.
pub fn manual_flush_tick(timeline: &Timeline) -> Option<u64> {
    timeline.buffer().iter().map(|s| s.end_tick).max()
}

/// Summaries removed from a buffer by [`drain`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlushBatch {
    /// Drained summaries in arrival order.
    pub summaries: Vec<EventSummary>,
    /// Watermark before the drain.
    pub previous_watermark: u64,
    /// Watermark after the drain.
    pub watermark: u64,
}

impl FlushBatch {
    /// Translate every summary and join the non-empty results with a blank
    /// line.
    pub fn render(&self, translator: &EventTranslator, locale: Locale) -> String {
        self.summaries
            .iter()
            .map(|s| translator.translate(s, locale))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Empty the buffer and advance the watermark to `flush_tick`.
///
/// Returns `None` for an empty buffer. The watermark never moves
/// backwards.
pub fn drain(timeline: &mut Timeline, flush_tick: u64) -> Option<FlushBatch> {
    if timeline.buffer().is_empty() {
        return None;
    }
    let previous_watermark = timeline.watermark();
    let summaries = std::mem::take(timeline.buffer_mut());
    let watermark = previous_watermark.max(flush_tick);
    timeline.set_watermark(watermark);
    Some(FlushBatch {
        summaries,
        previous_watermark,
        watermark,
    })
}
