//! Pan/zoom time windows.
//!
//! A [`ViewWindow`] is a zoom level plus an optional anchor (`window_end`).
//! Without an anchor the window follows the live tail: its end tracks the
//! injected `now`, so the view must be recomputed on every tick. Panning
//! sets an anchor, freezing the window until the next pan, zoom, refresh or
//! in-window push.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LiveError;

/// Slack added past `now` so a message stamped exactly `now` is inside a
/// tail window's exclusive end.
const TAIL_SLACK_SECS: i64 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zoom {
    #[default]
    OneHour,
    FourHours,
    OneDay,
    SevenDays,
    /// Everything loaded, from the earliest message on.
    All,
}

impl Zoom {
    pub const LEVELS: [Self; 5] = [
        Self::OneHour,
        Self::FourHours,
        Self::OneDay,
        Self::SevenDays,
        Self::All,
    ];

    /// Window length, or `None` for [`Zoom::All`].
    #[must_use]
    pub fn span(self) -> Option<TimeDelta> {
        match self {
            Self::OneHour => Some(TimeDelta::hours(1)),
            Self::FourHours => Some(TimeDelta::hours(4)),
            Self::OneDay => Some(TimeDelta::hours(24)),
            Self::SevenDays => Some(TimeDelta::days(7)),
            Self::All => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "24h",
            Self::SevenDays => "7d",
            Self::All => "all",
        }
    }

    /// Next narrower level; `OneHour` stays put.
    #[must_use]
    pub const fn zoom_in(self) -> Self {
        match self {
            Self::OneHour | Self::FourHours => Self::OneHour,
            Self::OneDay => Self::FourHours,
            Self::SevenDays => Self::OneDay,
            Self::All => Self::SevenDays,
        }
    }

    /// Next wider level; `All` stays put.
    #[must_use]
    pub const fn zoom_out(self) -> Self {
        match self {
            Self::OneHour => Self::FourHours,
            Self::FourHours => Self::OneDay,
            Self::OneDay => Self::SevenDays,
            Self::SevenDays | Self::All => Self::All,
        }
    }
}

impl fmt::Display for Zoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Zoom {
    type Err = LiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::LEVELS
            .into_iter()
            .find(|zoom| zoom.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LiveError::UnknownZoom(s.to_string()))
    }
}

/// Zoom level plus optional pan anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewWindow {
    pub zoom: Zoom,
    /// Exclusive end of a panned window. `None` follows the live tail.
    pub window_end: Option<DateTime<Utc>>,
}

impl ViewWindow {
    /// A window following the live tail.
    #[must_use]
    pub const fn tail(zoom: Zoom) -> Self {
        Self {
            zoom,
            window_end: None,
        }
    }

    #[must_use]
    pub const fn follows_tail(&self) -> bool {
        self.window_end.is_none()
    }

    /// Resolve to `[start, end)`.
    ///
    /// `earliest` is the oldest loaded message; it bounds [`Zoom::All`].
    #[must_use]
    pub fn bounds(
        &self,
        now: DateTime<Utc>,
        earliest: Option<DateTime<Utc>>,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = self.window_end.unwrap_or_else(|| tail_end(now));
        let start = match self.zoom.span() {
            Some(span) => end - span,
            None => earliest.map_or(end, |first| first.min(end)),
        };
        (start, end)
    }

    /// Shift by `steps` window lengths (negative is back in time).
    ///
    /// Panning to or past the live tail resumes following it. Panning has no
    /// effect at [`Zoom::All`].
    pub fn pan(&mut self, steps: i32, now: DateTime<Utc>) {
        let Some(span) = self.zoom.span() else {
            return;
        };
        let tail = tail_end(now);
        let current = self.window_end.unwrap_or(tail);
        let moved = current + span * steps;
        self.window_end = (moved < tail).then_some(moved);
    }

    /// Change zoom, keeping the anchor.
    pub const fn set_zoom(&mut self, zoom: Zoom) {
        self.zoom = zoom;
    }

    pub const fn follow_tail(&mut self) {
        self.window_end = None;
    }
}

fn tail_end(now: DateTime<Utc>) -> DateTime<Utc> {
    now + TimeDelta::seconds(TAIL_SLACK_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("valid ts")
    }

    #[test]
    fn zoom_levels_parse_and_cycle() {
        assert_eq!("4H".parse::<Zoom>().expect("parse"), Zoom::FourHours);
        assert_eq!("all".parse::<Zoom>().expect("parse"), Zoom::All);
        assert!("2h".parse::<Zoom>().is_err());
        assert_eq!(Zoom::All.zoom_in(), Zoom::SevenDays);
        assert_eq!(Zoom::OneHour.zoom_in(), Zoom::OneHour);
        assert_eq!(Zoom::SevenDays.zoom_out(), Zoom::All);
        assert_eq!(Zoom::OneDay.to_string(), "24h");
    }

    #[test]
    fn tail_window_tracks_now() {
        let window = ViewWindow::tail(Zoom::OneHour);
        let (start, end) = window.bounds(at(7_200), None);
        assert_eq!(end, at(7_201));
        assert_eq!(start, at(3_601));
    }

    #[test]
    fn all_zoom_starts_at_earliest() {
        let window = ViewWindow::tail(Zoom::All);
        assert_eq!(window.bounds(at(100), Some(at(5))), (at(5), at(101)));
        assert_eq!(window.bounds(at(100), None), (at(101), at(101)));
    }

    #[test]
    fn panning_anchors_and_returns_to_tail() {
        let now = at(10 * 3_600);
        let mut window = ViewWindow::tail(Zoom::OneHour);

        window.pan(-2, now);
        assert_eq!(window.window_end, Some(now + TimeDelta::seconds(1) - TimeDelta::hours(2)));
        assert!(!window.follows_tail());

        window.pan(1, now);
        assert!(!window.follows_tail());
        window.pan(1, now);
        assert!(window.follows_tail());
    }

    #[test]
    fn pan_is_ignored_at_all_zoom() {
        let mut window = ViewWindow::tail(Zoom::All);
        window.pan(-3, at(0));
        assert!(window.follows_tail());
    }
}
