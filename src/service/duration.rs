//! Punishment duration grammar
//!
//! A duration argument is either a short form (`30m`, `2h`, `7d`, `1w`,
//! `1y`, bare integer seconds) or a label from the fixed preset shown in
//! the UI. The parsed value is an absolute deadline in epoch seconds;
//! `0` means permanent.

/// One hour, applied when the input cannot be parsed.
const FALLBACK_SECS: i64 = 3600;

/// Fixed preset offered by the UI keyboard, label to offset in seconds
/// (0 = permanent).
pub const DURATION_PRESETS: &[(&str, i64)] = &[
    ("1 минута", 60),
    ("30 минут", 1800),
    ("1 час", 3600),
    ("6 часов", 21600),
    ("1 день", 86400),
    ("7 дней", 604800),
    ("30 дней", 2592000),
    ("Навсегда", 0),
];

/// Parse a duration argument into an absolute deadline.
///
/// Rules:
/// - `"0"`, `"forever"`, `"perm"`, or the permanent preset label -> `0`
/// - suffixed short form -> `now + N * multiplier` (m/h/d/w/y)
/// - bare integer N -> `now + N` seconds
/// - anything else -> `now + 3600`
pub fn parse_duration(input: &str, now: i64) -> i64 {
    let input = input.trim();

    if matches!(input, "0" | "forever" | "perm") {
        return 0;
    }

    let lowered = input.to_lowercase();
    for (label, offset) in DURATION_PRESETS {
        if lowered == label.to_lowercase() {
            return if *offset == 0 { 0 } else { now + offset };
        }
    }

    if let Ok(seconds) = input.parse::<i64>() {
        if seconds <= 0 {
            return 0;
        }
        // Absurdly large values overflow the deadline; treat as unparseable.
        return now.checked_add(seconds).unwrap_or(now + FALLBACK_SECS);
    }

    if input.len() >= 2 {
        let (number, suffix) = input.split_at(input.len() - 1);
        let multiplier = match suffix {
            "m" => Some(60),
            "h" => Some(3600),
            "d" => Some(86400),
            "w" => Some(604800),
            "y" => Some(31536000),
            _ => None,
        };
        if let (Some(multiplier), Ok(n)) = (multiplier, number.parse::<i64>()) {
            if n > 0 {
                if let Some(until) = n.checked_mul(multiplier).and_then(|s| now.checked_add(s)) {
                    return until;
                }
            }
        }
    }

    now + FALLBACK_SECS
}

/// Human-readable duration for audit records and replies.
pub fn format_duration(until: i64, now: i64) -> String {
    if until == 0 {
        return "Навсегда".to_string();
    }

    let remaining = (until - now).max(0);
    if remaining >= 86400 {
        format!("{} дн.", remaining / 86400)
    } else if remaining >= 3600 {
        format!("{} ч.", remaining / 3600)
    } else {
        format!("{} мин.", (remaining / 60).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn short_forms_use_their_multipliers() {
        assert_eq!(parse_duration("30m", NOW), NOW + 1800);
        assert_eq!(parse_duration("2h", NOW), NOW + 7200);
        assert_eq!(parse_duration("7d", NOW), NOW + 7 * 86400);
        assert_eq!(parse_duration("1w", NOW), NOW + 604800);
        assert_eq!(parse_duration("1y", NOW), NOW + 31536000);
    }

    #[test]
    fn zero_and_permanent_words_mean_permanent() {
        assert_eq!(parse_duration("0", NOW), 0);
        assert_eq!(parse_duration("forever", NOW), 0);
        assert_eq!(parse_duration("perm", NOW), 0);
        assert_eq!(parse_duration("Навсегда", NOW), 0);
    }

    #[test]
    fn bare_integer_is_seconds_from_now() {
        assert_eq!(parse_duration("90", NOW), NOW + 90);
    }

    #[test]
    fn preset_labels_resolve_to_offsets() {
        assert_eq!(parse_duration("30 минут", NOW), NOW + 1800);
        assert_eq!(parse_duration("1 день", NOW), NOW + 86400);
    }

    #[test]
    fn garbage_falls_back_to_one_hour() {
        assert_eq!(parse_duration("soon", NOW), NOW + 3600);
        assert_eq!(parse_duration("", NOW), NOW + 3600);
        assert_eq!(parse_duration("12q", NOW), NOW + 3600);
    }

    #[test]
    fn overflowing_inputs_fall_back_instead_of_wrapping() {
        assert_eq!(parse_duration("9223372036854775807", NOW), NOW + 3600);
        assert_eq!(parse_duration("999999999999y", NOW), NOW + 3600);
    }

    #[test]
    fn preset_labels_match_any_case() {
        assert_eq!(parse_duration("навсегда", NOW), 0);
        assert_eq!(parse_duration("30 МИНУТ", NOW), NOW + 1800);
    }

    #[test]
    fn formatting_matches_audit_expectations() {
        assert_eq!(format_duration(0, NOW), "Навсегда");
        assert_eq!(format_duration(NOW + 1800, NOW), "30 мин.");
        assert_eq!(format_duration(NOW + 7200, NOW), "2 ч.");
        assert_eq!(format_duration(NOW + 3 * 86400, NOW), "3 дн.");
    }
}
