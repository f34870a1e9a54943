//! `date(<pattern>)` formatting with pattern letters
//!
//! Letters repeat to select width or text style (`yyyy`, `MM`, `MMM`, `EEEE`),
//! text inside single quotes is literal and `''` is a quote. Any other
//! non-letter character is copied as-is.

use chrono::{DateTime, Datelike, FixedOffset, Timelike};

/// Format `at` according to `pattern`
pub fn format_timestamp(at: &DateTime<FixedOffset>, pattern: &str) -> Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // '' outside a literal is an escaped quote
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(format!("unterminated quote in date pattern \"{}\"", pattern)),
                    Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                        out.push('\'');
                        i += 2;
                    }
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(&other) => {
                        out.push(other);
                        i += 1;
                    }
                }
            }
            continue;
        }

        if !c.is_ascii_alphabetic() {
            out.push(c);
            i += 1;
            continue;
        }

        let mut count = 1;
        while chars.get(i + count) == Some(&c) {
            count += 1;
        }
        i += count;

        write_field(&mut out, at, c, count)
            .map_err(|_| format!("unsupported pattern letter '{}' in \"{}\"", c, pattern))?;
    }

    Ok(out)
}

fn pad(out: &mut String, value: i64, width: usize) {
    if value < 0 {
        out.push('-');
    }
    out.push_str(&format!("{:0width$}", value.abs(), width = width));
}

fn write_field(
    out: &mut String,
    at: &DateTime<FixedOffset>,
    letter: char,
    count: usize,
) -> Result<(), ()> {
    match letter {
        'y' | 'u' => {
            let year = at.year() as i64;
            if count == 2 {
                pad(out, year.rem_euclid(100), 2);
            } else {
                pad(out, year, count);
            }
        }
        'M' | 'L' => match count {
            1 | 2 => pad(out, at.month() as i64, count),
            3 => out.push_str(&at.format("%b").to_string()),
            4 => out.push_str(&at.format("%B").to_string()),
            _ => out.push_str(&at.format("%B").to_string()[..1]),
        },
        'd' => pad(out, at.day() as i64, count),
        'D' => pad(out, at.ordinal() as i64, count),
        'H' => pad(out, at.hour() as i64, count),
        'k' => pad(out, if at.hour() == 0 { 24 } else { at.hour() as i64 }, count),
        'h' => pad(out, at.hour12().1 as i64, count),
        'K' => pad(out, (at.hour() % 12) as i64, count),
        'm' => pad(out, at.minute() as i64, count),
        's' => pad(out, at.second() as i64, count),
        'S' => {
            let nanos = format!("{:09}", at.nanosecond() % 1_000_000_000);
            if count <= 9 {
                out.push_str(&nanos[..count]);
            } else {
                out.push_str(&nanos);
                out.push_str(&"0".repeat(count - 9));
            }
        }
        'a' => out.push_str(if at.hour12().0 { "PM" } else { "AM" }),
        'E' => match count {
            1..=3 => out.push_str(&at.format("%a").to_string()),
            4 => out.push_str(&at.format("%A").to_string()),
            _ => out.push_str(&at.format("%A").to_string()[..1]),
        },
        'Z' => match count {
            1..=3 => out.push_str(&format_offset(at, 2)),
            4 => {
                out.push_str("GMT");
                if !is_utc(at) {
                    out.push_str(&format_offset(at, 3));
                }
            }
            _ if is_utc(at) => out.push('Z'),
            _ => out.push_str(&format_offset(at, 3)),
        },
        'X' if is_utc(at) => out.push('Z'),
        'X' => out.push_str(&format_offset(at, count)),
        'x' => out.push_str(&format_offset(at, count)),
        // No zone database: zone names render as the offset
        'z' | 'V' | 'O' => out.push_str(&at.format("%:z").to_string()),
        _ => return Err(()),
    }
    Ok(())
}

/// `+01`, `+0100` or `+01:00`; a single letter drops zero minutes
fn format_offset(at: &DateTime<FixedOffset>, count: usize) -> String {
    let seconds = at.offset().local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let hours = seconds.abs() / 3600;
    let minutes = seconds.abs() % 3600 / 60;
    match count {
        1 if minutes == 0 => format!("{}{:02}", sign, hours),
        1 | 2 | 4 => format!("{}{:02}{:02}", sign, hours, minutes),
        _ => format!("{}{:02}:{:02}", sign, hours, minutes),
    }
}

fn is_utc(at: &DateTime<FixedOffset>) -> bool {
    at.offset().local_minus_utc() == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-05T14:07:09.123456789+01:00").unwrap()
    }

    #[test]
    fn test_numeric_fields() {
        assert_eq!(format_timestamp(&at(), "yyyy-MM-dd HH:mm:ss").unwrap(), "2024-03-05 14:07:09");
        assert_eq!(format_timestamp(&at(), "yyMMdd").unwrap(), "240305");
        assert_eq!(format_timestamp(&at(), "d/M/y").unwrap(), "5/3/2024");
        assert_eq!(format_timestamp(&at(), "DDD").unwrap(), "065");
    }

    #[test]
    fn test_fraction_and_clock() {
        assert_eq!(format_timestamp(&at(), "ss.SSS").unwrap(), "09.123");
        assert_eq!(format_timestamp(&at(), "hh:mm a").unwrap(), "02:07 PM");
    }

    #[test]
    fn test_text_fields() {
        assert_eq!(format_timestamp(&at(), "EEE, dd MMM yyyy").unwrap(), "Tue, 05 Mar 2024");
        assert_eq!(format_timestamp(&at(), "EEEE MMMM").unwrap(), "Tuesday March");
    }

    #[test]
    fn test_offsets() {
        assert_eq!(format_timestamp(&at(), "Z").unwrap(), "+0100");
        assert_eq!(format_timestamp(&at(), "XXX").unwrap(), "+01:00");
        let utc = DateTime::parse_from_rfc3339("2024-03-05T14:07:09Z").unwrap();
        assert_eq!(format_timestamp(&utc, "XXX").unwrap(), "Z");
        assert_eq!(format_timestamp(&utc, "xxx").unwrap(), "+00:00");
    }

    #[test]
    fn test_quoted_literals() {
        assert_eq!(
            format_timestamp(&at(), "yyyy-MM-dd'T'HH:mm").unwrap(),
            "2024-03-05T14:07"
        );
        assert_eq!(format_timestamp(&at(), "'o''clock' H").unwrap(), "o'clock 14");
        assert_eq!(format_timestamp(&at(), "''").unwrap(), "'");
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(format_timestamp(&at(), "yyyy-qq").is_err());
        assert!(format_timestamp(&at(), "'open").is_err());
    }
}
