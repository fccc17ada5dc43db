//! printf-style value formats used by screen columns.
//!
//! A format holds exactly one conversion (`%d %i %u %x %X %f %F %e %E %g %G`)
//! with optional flags (`- + 0 space #`), width and precision. C length
//! modifiers (`l`, `ll`, `h`, `z`, ...) are accepted and ignored, so formats
//! such as `%9lu` copied from existing configurations keep working.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("no conversion in format '{0}'")]
    NoConversion(String),
    #[error("more than one conversion in format '{0}'")]
    TooManyConversions(String),
    #[error("unsupported conversion '%{conv}' in format '{format}'")]
    Unsupported { conv: char, format: String },
    #[error("field width or precision above 1024 in format '{0}'")]
    FieldTooWide(String),
}

/// Upper bound for width and precision.
pub const MAX_FIELD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Signed,
    Unsigned,
    HexLower,
    HexUpper,
    Fixed,
    Exp { upper: bool },
    General,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Flags {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alternate: bool,
}

/// Parsed column format.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueFormat {
    source: String,
    prefix: String,
    suffix: String,
    flags: Flags,
    width: usize,
    precision: Option<usize>,
    conversion: Conversion,
}

fn unescape_percent(text: &str) -> String {
    text.replace("%%", "%")
}

impl ValueFormat {
    pub fn parse(format: &str) -> Result<Self, FormatError> {
        let chars: Vec<char> = format.chars().collect();
        let mut spec: Option<(usize, usize)> = None;
        let mut i = 0;

        while i < chars.len() {
            if chars[i] != '%' {
                i += 1;
                continue;
            }
            if chars.get(i + 1) == Some(&'%') {
                i += 2;
                continue;
            }
            let start = i;
            i += 1;
            while i < chars.len() && matches!(chars[i], '-' | '+' | '0' | ' ' | '#') {
                i += 1;
            }
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            while i < chars.len() && matches!(chars[i], 'h' | 'l' | 'L' | 'q' | 'j' | 'z' | 't') {
                i += 1;
            }
            if i >= chars.len() {
                return Err(FormatError::NoConversion(format.to_string()));
            }
            if spec.is_some() {
                return Err(FormatError::TooManyConversions(format.to_string()));
            }
            spec = Some((start, i));
            i += 1;
        }

        let (start, end) = spec.ok_or_else(|| FormatError::NoConversion(format.to_string()))?;
        let conv_char = chars[end];
        let conversion = match conv_char {
            'd' | 'i' => Conversion::Signed,
            'u' => Conversion::Unsigned,
            'x' => Conversion::HexLower,
            'X' => Conversion::HexUpper,
            'f' | 'F' => Conversion::Fixed,
            'e' => Conversion::Exp { upper: false },
            'E' => Conversion::Exp { upper: true },
            'g' | 'G' => Conversion::General,
            other => {
                return Err(FormatError::Unsupported {
                    conv: other,
                    format: format.to_string(),
                })
            }
        };

        let mut flags = Flags::default();
        let mut j = start + 1;
        while j < end {
            match chars[j] {
                '-' => flags.left = true,
                '+' => flags.plus = true,
                '0' => flags.zero = true,
                ' ' => flags.space = true,
                '#' => flags.alternate = true,
                _ => break,
            }
            j += 1;
        }

        let too_wide = || FormatError::FieldTooWide(format.to_string());
        let mut width = 0;
        while j < end && chars[j].is_ascii_digit() {
            width = field_digit(width, chars[j]).ok_or_else(too_wide)?;
            j += 1;
        }
        let mut precision = None;
        if j < end && chars[j] == '.' {
            j += 1;
            let mut p = 0;
            while j < end && chars[j].is_ascii_digit() {
                p = field_digit(p, chars[j]).ok_or_else(too_wide)?;
                j += 1;
            }
            precision = Some(p);
        }

        Ok(Self {
            source: format.to_string(),
            prefix: unescape_percent(&chars[..start].iter().collect::<String>()),
            suffix: unescape_percent(&chars[end + 1..].iter().collect::<String>()),
            flags,
            width,
            precision,
            conversion,
        })
    }

    /// Renders `value`. Integer conversions truncate toward zero.
    pub fn format(&self, value: f64) -> String {
        let (radix_prefix, digits) = match self.conversion {
            Conversion::Signed => ("", format!("{}", value.trunc().abs() as u64)),
            Conversion::Unsigned => ("", format!("{}", value.max(0.0) as u64)),
            Conversion::HexLower | Conversion::HexUpper => {
                let v = value.max(0.0) as u64;
                let upper = self.conversion == Conversion::HexUpper;
                let prefix = match (self.flags.alternate && v != 0, upper) {
                    (true, false) => "0x",
                    (true, true) => "0X",
                    (false, _) => "",
                };
                let digits = if upper {
                    format!("{:X}", v)
                } else {
                    format!("{:x}", v)
                };
                (prefix, digits)
            }
            Conversion::Fixed => {
                let p = self.precision.unwrap_or(6);
                ("", format!("{:.*}", p, value.abs()))
            }
            Conversion::Exp { upper } => {
                let p = self.precision.unwrap_or(6);
                let text = c_exponent(&format!("{:.*e}", p, value.abs()));
                ("", if upper { text.to_uppercase() } else { text })
            }
            Conversion::General => ("", format!("{}", value.abs())),
        };
        let negative = match self.conversion {
            Conversion::Fixed | Conversion::Exp { .. } | Conversion::General => {
                value.is_sign_negative() && value != 0.0
            }
            Conversion::Signed => value.trunc() < 0.0,
            _ => false,
        };

        let sign = if negative {
            "-"
        } else if self.flags.plus && self.signed() {
            "+"
        } else if self.flags.space && self.signed() {
            " "
        } else {
            ""
        };

        let len = sign.len() + radix_prefix.len() + digits.chars().count();
        let pad = self.width.saturating_sub(len);
        let field = if self.flags.left {
            format!("{}{}{}{}", sign, radix_prefix, digits, " ".repeat(pad))
        } else if self.flags.zero && value.is_finite() {
            format!("{}{}{}{}", sign, radix_prefix, "0".repeat(pad), digits)
        } else {
            format!("{}{}{}{}", " ".repeat(pad), sign, radix_prefix, digits)
        };

        format!("{}{}{}", self.prefix, field, self.suffix)
    }

    fn signed(&self) -> bool {
        !matches!(
            self.conversion,
            Conversion::Unsigned | Conversion::HexLower | Conversion::HexUpper
        )
    }

    /// Printed width of any value rendered with this format, when it fits.
    pub fn min_width(&self) -> usize {
        self.prefix.chars().count() + self.width + self.suffix.chars().count()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn field_digit(acc: usize, digit: char) -> Option<usize> {
    acc.checked_mul(10)?
        .checked_add(digit.to_digit(10)? as usize)
        .filter(|v| *v <= MAX_FIELD)
}

// Rust prints `1.5e3`, C prints `1.5e+03`.
fn c_exponent(text: &str) -> String {
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: &str, value: f64) -> String {
        ValueFormat::parse(format).unwrap().format(value)
    }

    #[test]
    fn test_fixed_with_width_and_precision() {
        assert_eq!(fmt("%5.1f", 12.345), " 12.3");
        assert_eq!(fmt("%8.2f", 1.5), "    1.50");
        assert_eq!(fmt("%4.2f", 0.0), "0.00");
        assert_eq!(fmt("%5.1f", -2.26), " -2.3");
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(fmt("%2d", 3.0), " 3");
        assert_eq!(fmt("%2d", 3.9), " 3");
        assert_eq!(fmt("%d", -7.0), "-7");
        assert_eq!(fmt("%9lu", 123456.0), "   123456");
        assert_eq!(fmt("%x", 255.0), "ff");
        assert_eq!(fmt("%#06X", 255.0), "0X00FF");
    }

    #[test]
    fn test_literals_around_conversion() {
        assert_eq!(fmt("  %5.2f", 1.0), "   1.00");
        assert_eq!(fmt("   %5.2f ", 1.0), "    1.00 ");
        assert_eq!(fmt("%5.1f%%", 50.0), " 50.0%");
    }

    #[test]
    fn test_flags() {
        assert_eq!(fmt("%-6.1f|", 1.0), "1.0   |");
        assert_eq!(fmt("%06.1f", -1.0), "-001.0");
        assert_eq!(fmt("%+.1f", 1.0), "+1.0");
        assert_eq!(fmt("% d", 5.0), " 5");
    }

    #[test]
    fn test_exponent_matches_c() {
        assert_eq!(fmt("%.2e", 1500.0), "1.50e+03");
        assert_eq!(fmt("%.1E", 0.05), "5.0E-02");
    }

    #[test]
    fn test_min_width() {
        assert_eq!(ValueFormat::parse(" %4.1f").unwrap().min_width(), 5);
        assert_eq!(ValueFormat::parse("%2d").unwrap().min_width(), 2);
    }

    #[test]
    fn test_rejects_bad_formats() {
        assert!(matches!(
            ValueFormat::parse("abc"),
            Err(FormatError::NoConversion(_))
        ));
        assert!(matches!(
            ValueFormat::parse("%d %d"),
            Err(FormatError::TooManyConversions(_))
        ));
        assert!(matches!(
            ValueFormat::parse("%s"),
            Err(FormatError::Unsupported { conv: 's', .. })
        ));
        assert!(matches!(
            ValueFormat::parse("%5."),
            Err(FormatError::NoConversion(_))
        ));
        assert!(matches!(
            ValueFormat::parse("100%%"),
            Err(FormatError::NoConversion(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_fields() {
        assert!(matches!(
            ValueFormat::parse("%99999999999999999999f"),
            Err(FormatError::FieldTooWide(_))
        ));
        assert!(matches!(
            ValueFormat::parse("%.5000f"),
            Err(FormatError::FieldTooWide(_))
        ));
        assert!(matches!(
            ValueFormat::parse("%1025d"),
            Err(FormatError::FieldTooWide(_))
        ));
        let widest = ValueFormat::parse("%1024d").unwrap();
        assert_eq!(widest.format(1.0).len(), MAX_FIELD);
    }
}
