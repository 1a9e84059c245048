//! Selection policy: which segment does the annotator see next
//!
//! Works over a recording's segments ordered by start offset, using whatever
//! uncertainty scores the store currently holds (possibly stale while a
//! scoring pass is mid-flight; accepted). Pure function, no store access.
//!
//! The focus segment is the unlabeled segment with the maximum uncertainty.
//! Ties resolve to the first encountered in iteration order; equal scores
//! carry no meaning, so no deterministic tie-break is promised.

use crate::config::{SEGMENT_SECONDS, WINDOW_SECONDS};
use crate::db::segments::Segment;
use serde::{Deserialize, Serialize};

/// Annotation view mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Single 5-second segment, no context
    Coarse,
    /// The focus segment plus its surrounding minute of context
    Windowed,
}

/// Result of a selection: the focus segment, the exposed time window, and
/// every segment inside that window
#[derive(Debug)]
pub struct Selection<'a> {
    pub focus: &'a Segment,
    pub window_start: f64,
    pub window_end: f64,
    pub segments: Vec<&'a Segment>,
}

/// Pick the next segment(s) to present. `segments` must be one recording's
/// segments ordered by start offset. Returns None when every segment is
/// labeled ("nothing to annotate", not an error).
pub fn select_next(segments: &[Segment], mode: SelectionMode) -> Option<Selection<'_>> {
    let focus = segments
        .iter()
        .filter(|s| !s.is_labeled())
        .fold(None::<&Segment>, |best, s| match best {
            Some(b) if s.uncertainty > b.uncertainty => Some(s),
            None => Some(s),
            keep => keep,
        })?;

    match mode {
        SelectionMode::Coarse => Some(Selection {
            focus,
            window_start: focus.t_start,
            window_end: focus.t_start + SEGMENT_SECONDS,
            segments: vec![focus],
        }),
        SelectionMode::Windowed => {
            // Align to the minute boundary containing the focus segment
            let window_start = (focus.t_start / WINDOW_SECONDS).floor() * WINDOW_SECONDS;
            let window_end = window_start + WINDOW_SECONDS;
            let window: Vec<&Segment> = segments
                .iter()
                .filter(|s| s.t_start >= window_start && s.t_start < window_end)
                .collect();
            Some(Selection {
                focus,
                window_start,
                window_end,
                segments: window,
            })
        }
    }
}
