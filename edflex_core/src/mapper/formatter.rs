//! Human-readable labels for content metadata.

/// Content types known upstream, with their display labels.
pub const CONTENT_TYPES: &[(&str, &str)] = &[
    ("program", "Program"),
    ("article", "Article"),
    ("video", "Video"),
    ("mooc", "Course"),
    ("role-play", "Role play"),
    ("interactive", "Interactive"),
    ("top-voice", "Top voice"),
    ("assessment", "Assessment"),
    ("podcast", "Podcast"),
];

/// Content difficulty levels, with their display labels.
pub const CONTENT_LEVELS: &[(&str, &str)] = &[
    ("introductive", "Introductive"),
    ("intermediate", "Intermediate"),
    ("advanced", "Advanced"),
];

/// Produces display labels for raw content metadata.
///
/// Every method returns an empty string for `None`, the raw value unchanged when it is
/// not recognized, and a label otherwise.
pub trait Formatter: Send + Sync {
    fn format_duration(&self, raw: Option<&str>) -> String;
    fn format_type(&self, raw: Option<&str>) -> String;
    fn format_difficulty(&self, raw: Option<&str>) -> String;
}

/// English labels backed by the constant vocabularies above.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelFormatter;

impl LabelFormatter {
    fn lookup(table: &[(&str, &str)], raw: Option<&str>) -> String {
        let Some(raw) = raw else {
            return String::new();
        };
        table
            .iter()
            .find(|(key, _)| *key == raw)
            .map(|(_, label)| label.to_string())
            .unwrap_or_else(|| raw.to_string())
    }
}

impl Formatter for LabelFormatter {
    fn format_duration(&self, raw: Option<&str>) -> String {
        let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
            return String::new();
        };
        match IsoDuration::parse(raw.trim()) {
            Some(d) => d.render().unwrap_or_else(|| raw.to_string()),
            None => raw.to_string(),
        }
    }

    fn format_type(&self, raw: Option<&str>) -> String {
        Self::lookup(CONTENT_TYPES, raw)
    }

    fn format_difficulty(&self, raw: Option<&str>) -> String {
        Self::lookup(CONTENT_LEVELS, raw)
    }
}

/// ISO 8601 duration, e.g. `P1Y2M3W4DT5H6M7S`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct IsoDuration {
    years: u64,
    months: u64,
    weeks: u64,
    days: u64,
    hours: u64,
    minutes: u64,
    seconds: u64,
}

impl IsoDuration {
    fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix('P')?;
        if rest.is_empty() {
            return None;
        }

        let mut out = Self::default();
        let mut in_time = false;
        let mut digits = String::new();
        let mut seen_component = false;

        for ch in rest.chars() {
            match ch {
                '0'..='9' => digits.push(ch),
                'T' => {
                    if in_time || !digits.is_empty() {
                        return None;
                    }
                    in_time = true;
                }
                unit => {
                    let value: u64 = digits.parse().ok()?;
                    digits.clear();
                    let slot = match (in_time, unit) {
                        (false, 'Y') => &mut out.years,
                        (false, 'M') => &mut out.months,
                        (false, 'W') => &mut out.weeks,
                        (false, 'D') => &mut out.days,
                        (true, 'H') => &mut out.hours,
                        (true, 'M') => &mut out.minutes,
                        (true, 'S') => &mut out.seconds,
                        _ => return None,
                    };
                    *slot = value;
                    seen_component = true;
                }
            }
        }

        if !digits.is_empty() || !seen_component {
            return None;
        }
        Some(out)
    }

    /// `None` when every component is zero.
    fn render(&self) -> Option<String> {
        let parts: Vec<String> = [
            (self.years, "year"),
            (self.months, "month"),
            (self.weeks, "week"),
            (self.days, "day"),
            (self.hours, "hour"),
            (self.minutes, "minute"),
            (self.seconds, "second"),
        ]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| {
            if n == 1 {
                format!("{n} {unit}")
            } else {
                format!("{n} {unit}s")
            }
        })
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}
