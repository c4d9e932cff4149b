use crate::types::{FrameDirection, LateralDirection, SuspiciousEvent};

/// A maximal run of one lateral direction, by frame index (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    direction: LateralDirection,
    first: usize,
    last: usize,
}

impl Run {
    fn len(&self) -> usize {
        self.last - self.first + 1
    }
}

/// Extract sustained-glance events in one left-to-right pass.
///
/// Only Left/Right frames start or extend a run; Center and Undetected
/// frames close whatever run is open. `fps` must already be normalized.
pub fn detect_events(
    sequence: &[FrameDirection],
    fps: f64,
    threshold_seconds: f64,
) -> Vec<SuspiciousEvent> {
    let mut events = Vec::new();
    let mut open: Option<Run> = None;

    let mut close = |run: Run| {
        let duration = run.len() as f64 / fps;
        if duration >= threshold_seconds {
            events.push(SuspiciousEvent {
                start_time_seconds: run.first as f64 / fps,
                end_time_seconds: run.last as f64 / fps,
                duration_seconds: duration,
                direction: run.direction,
            });
        }
    };

    for (idx, label) in sequence.iter().enumerate() {
        match (label.lateral(), open) {
            (Some(dir), Some(mut run)) if run.direction == dir => {
                run.last = idx;
                open = Some(run);
            }
            (Some(dir), previous) => {
                if let Some(run) = previous {
                    close(run);
                }
                open = Some(Run {
                    direction: dir,
                    first: idx,
                    last: idx,
                });
            }
            (None, previous) => {
                if let Some(run) = previous {
                    close(run);
                }
                open = None;
            }
        }
    }

    // A run reaching the final frame is still evaluated.
    if let Some(run) = open {
        close(run);
    }

    events
}
