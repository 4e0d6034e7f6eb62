//! Mapping between playback time and positions on the timeline strip.

use anyhow::{bail, Context, Result};
use serde::Serialize;

use super::state::{FragmentBook, Project};

/// Fraction of the timeline covered at `time`, clamped to `[0, 1]`.
pub fn position_fraction(time: f64, duration: f64) -> f64 {
    if !(duration.is_finite() && duration > 0.0) || !time.is_finite() {
        return 0.0;
    }
    (time / duration).clamp(0.0, 1.0)
}

/// Playback time for a click at `click_fraction` of the timeline width.
pub fn seek_time(click_fraction: f64, duration: f64) -> f64 {
    if !(duration.is_finite() && duration > 0.0) || !click_fraction.is_finite() {
        return 0.0;
    }
    click_fraction.clamp(0.0, 1.0) * duration
}

/// `HH:MM:SS`, truncating sub-second precision.
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// `HH:MM:SS` with a `.mmm` suffix when the time is not a whole second.
/// Used on the wire so sub-second fragments keep `end > start`.
pub fn format_clip_time(seconds: f64) -> String {
    let millis = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };
    let whole = format_timestamp((millis / 1000) as f64);
    match millis % 1000 {
        0 => whole,
        fraction => format!("{whole}.{fraction:03}"),
    }
}

/// Accepts `HH:MM:SS`, `MM:SS` or plain seconds, each with optional fractional seconds.
pub fn parse_timestamp(value: &str) -> Result<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("empty timestamp");
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() > 3 {
        bail!("timestamp '{trimmed}' has too many components");
    }

    let (units, last) = parts.split_at(parts.len() - 1);
    let seconds: f64 = last[0]
        .parse()
        .with_context(|| format!("invalid seconds in timestamp '{trimmed}'"))?;
    if !seconds.is_finite() || seconds < 0.0 || (!units.is_empty() && seconds >= 60.0) {
        bail!("seconds out of range in timestamp '{trimmed}'");
    }

    let mut total = 0u64;
    for (index, unit) in units.iter().enumerate() {
        let parsed: u64 = unit
            .parse()
            .with_context(|| format!("invalid component '{unit}' in timestamp '{trimmed}'"))?;
        // minutes are bounded only when hours precede them
        if index > 0 && parsed >= 60 {
            bail!("minutes out of range in timestamp '{trimmed}'");
        }
        total = total
            .checked_mul(60)
            .and_then(|t| t.checked_add(parsed))
            .with_context(|| format!("timestamp '{trimmed}' is out of range"))?;
    }

    Ok(total as f64 * 60.0 + seconds)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FragmentBar {
    pub project: Project,
    pub id: String,
    pub left: f64,
    pub width: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnfinishedMarker {
    pub project: Project,
    pub left: f64,
}

/// Everything the renderer needs to draw the timeline, as fractions of its width.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimelineLayout {
    pub playhead: f64,
    pub bars: Vec<FragmentBar>,
    pub markers: Vec<UnfinishedMarker>,
}

pub fn layout(book: &FragmentBook, duration: f64, current_time: f64) -> TimelineLayout {
    let bars = Project::ALL
        .iter()
        .flat_map(|project| book.fragments(*project))
        .map(|fragment| {
            let left = position_fraction(fragment.start, duration);
            let right = position_fraction(fragment.end, duration);
            FragmentBar {
                project: fragment.project,
                id: fragment.id.clone(),
                left,
                width: (right - left).max(0.0),
            }
        })
        .collect();

    let markers = book
        .unfinished_entries()
        .map(|(project, unfinished)| UnfinishedMarker {
            project,
            left: position_fraction(unfinished.start, duration),
        })
        .collect();

    TimelineLayout {
        playhead: position_fraction(current_time, duration),
        bars,
        markers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::state::ShortFragmentPolicy;

    #[test]
    fn fraction_and_seek_are_inverse_within_bounds() {
        assert_eq!(position_fraction(30.0, 120.0), 0.25);
        assert_eq!(seek_time(0.25, 120.0), 30.0);
        assert_eq!(position_fraction(500.0, 120.0), 1.0);
        assert_eq!(seek_time(-0.5, 120.0), 0.0);
        assert_eq!(seek_time(1.5, 120.0), 120.0);
    }

    #[test]
    fn unknown_duration_maps_to_origin() {
        assert_eq!(position_fraction(10.0, 0.0), 0.0);
        assert_eq!(position_fraction(10.0, f64::NAN), 0.0);
        assert_eq!(seek_time(0.5, 0.0), 0.0);
    }

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_timestamp(0.0), "00:00:00");
        assert_eq!(format_timestamp(5.9), "00:00:05");
        assert_eq!(format_timestamp(3725.0), "01:02:05");
        assert_eq!(format_timestamp(-3.0), "00:00:00");
    }

    #[test]
    fn clip_times_keep_milliseconds() {
        assert_eq!(format_clip_time(5.0), "00:00:05");
        assert_eq!(format_clip_time(5.1), "00:00:05.100");
        assert_eq!(format_clip_time(3725.8), "01:02:05.800");
        assert_eq!(format_clip_time(59.9996), "00:01:00");
        assert_eq!(parse_timestamp(&format_clip_time(5.8)).expect("parse"), 5.8);
    }

    #[test]
    fn oversized_components_are_rejected() {
        assert!(parse_timestamp("1000000000000000000:00:00").is_err());
        assert!(parse_timestamp("99999999999999999999:00").is_err());
    }

    #[test]
    fn parses_common_timestamp_shapes() {
        assert_eq!(parse_timestamp("01:02:05").expect("hms"), 3725.0);
        assert_eq!(parse_timestamp("02:05").expect("ms"), 125.0);
        assert_eq!(parse_timestamp("7.5").expect("s"), 7.5);
        assert_eq!(parse_timestamp(" 00:00:03.25 ").expect("fractional"), 3.25);
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("00:61:00").is_err());
        assert!(parse_timestamp("00:00:75").is_err());
        assert!(parse_timestamp("1:2:3:4").is_err());
        assert!(parse_timestamp("ab:00").is_err());
    }

    #[test]
    fn layout_places_bars_and_markers() {
        let mut book = FragmentBook::new();
        book.start_fragment(&[Project::Tracking], 10.0, false)
            .expect("start");
        book.end_fragment(None, 30.0, 100.0, ShortFragmentPolicy::Ask)
            .expect("end");
        book.start_fragment(&[Project::ReId], 50.0, false)
            .expect("start");

        let layout = layout(&book, 100.0, 75.0);
        assert_eq!(layout.playhead, 0.75);
        assert_eq!(layout.bars.len(), 1);
        assert_eq!(layout.bars[0].project, Project::Tracking);
        assert!((layout.bars[0].left - 0.1).abs() < 1e-9);
        assert!((layout.bars[0].width - 0.2).abs() < 1e-9);
        assert_eq!(
            layout.markers,
            vec![UnfinishedMarker {
                project: Project::ReId,
                left: 0.5
            }]
        );
    }
}
