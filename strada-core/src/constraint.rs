use chrono::NaiveDate;

/// A validator bound to a route parameter, evaluated after extraction and
/// before the handler chain runs.
///
/// Constraint failure is defined as a non-match, not a client error: the
/// matcher treats the route as if it had not matched, so an alternative
/// route can win and the final outcome of "nothing matched" is a 404.
#[derive(Debug)]
pub enum Constraint {
    /// Caller-supplied pattern, anchored end-to-end at compile time.
    Regex(regex::Regex),
    /// Signed decimal integer. Leading zeros are rejected except for the
    /// single digit `0`.
    Int,
    /// Decimal number with optional exponent. Textual `NaN`/`Inf` forms are
    /// rejected.
    Float,
    /// Hyphenated 8-4-4-4-12 UUID, case-insensitive.
    Uuid,
    /// `[A-Za-z]+`
    Alpha,
    /// `[A-Za-z0-9]+`
    AlphaNumeric,
    /// Exact match against a fixed, case-sensitive set, in registration
    /// order.
    Enum(Vec<Box<str>>),
    /// `YYYY-MM-DD`
    Date,
    /// RFC 3339 date-time.
    DateTime,
}

impl Constraint {
    /// Compile a caller-supplied regex constraint.
    ///
    /// The pattern is anchored as `^(?:pattern)$` so evaluation always
    /// covers the whole parameter value.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        let anchored = format!("^(?:{pattern})$");
        Ok(Constraint::Regex(regex::Regex::new(&anchored)?))
    }

    /// Build an enum constraint from its allowed values.
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Box<str>>,
    {
        Constraint::Enum(values.into_iter().map(Into::into).collect())
    }

    /// Evaluate the constraint against an extracted parameter value.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Constraint::Regex(re) => re.is_match(value),
            Constraint::Int => is_int(value),
            Constraint::Float => is_float(value),
            Constraint::Uuid => value.len() == 36 && uuid::Uuid::try_parse(value).is_ok(),
            Constraint::Alpha => {
                !value.is_empty() && value.bytes().all(|b| b.is_ascii_alphabetic())
            }
            Constraint::AlphaNumeric => {
                !value.is_empty() && value.bytes().all(|b| b.is_ascii_alphanumeric())
            }
            Constraint::Enum(values) => values.iter().any(|v| &**v == value),
            Constraint::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
            Constraint::DateTime => chrono::DateTime::parse_from_rfc3339(value).is_ok(),
        }
    }
}

fn is_int(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    digits == "0" || !digits.starts_with('0')
}

fn is_float(value: &str) -> bool {
    // Textual NaN/Inf forms carry letters other than the exponent marker.
    if value
        .bytes()
        .any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E')
    {
        return false;
    }
    value.parse::<f64>().is_ok()
}
