use crate::types::{
    AttentionReport, BatchResult, ItemError, PipelineItemResult, SkipReason, SuspiciousEvent,
};

/// Format seconds as MM:SS.ss timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let mins = (seconds / 60.0) as u32;
    let secs = seconds % 60.0;
    format!("{:02}:{:05.2}", mins, secs)
}

fn format_event(event: &SuspiciousEvent) -> String {
    format!(
        "[{}–{}] {:?} for {:.2}s",
        format_timestamp(event.start_time_seconds),
        format_timestamp(event.end_time_seconds),
        event.direction,
        event.duration_seconds
    )
}

fn format_item_error(error: &ItemError) -> String {
    match error {
        ItemError::TimedOut { after_seconds } => format!("timed out after {}s", after_seconds),
        ItemError::Cancelled => "cancelled".to_string(),
        ItemError::StagingFailed { message } => format!("staging failed: {}", message),
        ItemError::Internal { message } => format!("internal error: {}", message),
    }
}

fn skip_reason(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::UnsupportedExtension => "unsupported extension",
        SkipReason::NoQuestionMarker => "no question_<id> marker",
        SkipReason::InvalidQuestionId => "invalid question id",
        SkipReason::NotAFile => "not a file",
    }
}

/// Format one item result as human-readable markdown
pub fn format_item_readable(item: &PipelineItemResult) -> String {
    let mut output = String::new();

    match item.question_id {
        Some(id) => output.push_str(&format!("# {} (question {})\n\n", item.source, id)),
        None => output.push_str(&format!("# {}\n\n", item.source)),
    }

    if let Some(error) = &item.item_error {
        output.push_str(&format!("**Not completed:** {}\n\n", format_item_error(error)));
    }

    // Evaluation
    output.push_str("## Evaluation\n\n");
    match &item.evaluation {
        Some(eval) => {
            output.push_str(&format!("**Score:** {}/4\n\n", eval.score));
            output.push_str(&format!("{}\n\n", eval.reason));
        }
        None => output.push_str("_not available_\n\n"),
    }

    // Attention
    output.push_str("## Attention\n\n");
    match &item.attention {
        AttentionReport::Success(stats) => {
            output.push_str(&format!(
                "**Focus:** {:.2}% | **Left:** {:.2}% | **Right:** {:.2}%\n\n",
                stats.focus_percentage, stats.left_glance_percentage, stats.right_glance_percentage
            ));
            output.push_str(&format!(
                "**Duration:** {:.1}s at {:.2} fps | **Face detected:** {}/{} frames\n\n",
                stats.video_duration_seconds,
                stats.analysis_fps,
                stats.face_detected_frames,
                stats.total_frames
            ));
            output.push_str(&format!("{}\n\n", stats.summary_note));
            for event in &stats.suspicious_events {
                output.push_str(&format!("• {}\n", format_event(event)));
            }
            if !stats.suspicious_events.is_empty() {
                output.push('\n');
            }
        }
        AttentionReport::Failed { reason, error } => {
            output.push_str(&format!("**Failed** ({}): {}\n\n", reason, error));
        }
    }

    // Transcript
    output.push_str("## Transcript\n\n");
    match &item.transcript {
        Some(text) if !text.is_empty() => output.push_str(&format!("{}\n", text)),
        Some(_) => output.push_str("_empty_\n"),
        None => output.push_str("_not available_\n"),
    }

    if !item.stage_errors.is_empty() {
        output.push_str("\n## Stage Errors\n\n");
        for err in &item.stage_errors {
            output.push_str(&format!("• {:?}: {}\n", err.stage, err.message));
        }
    }

    output
}

/// Format a batch result as human-readable markdown
pub fn format_batch_readable(batch: &BatchResult) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "**Processed:** {} | **Skipped:** {}\n\n",
        batch.results.len(),
        batch.skipped.len()
    ));

    for item in &batch.results {
        output.push_str(&format_item_readable(item));
        output.push_str("\n---\n\n");
    }

    if !batch.skipped.is_empty() {
        output.push_str("## Skipped Files\n\n");
        for skipped in &batch.skipped {
            output.push_str(&format!("• {} ({})\n", skipped.file, skip_reason(skipped.reason)));
        }
    }

    output
}
