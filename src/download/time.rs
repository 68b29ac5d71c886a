/// Errors for clip boundary times
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("empty time value")]
    Empty,

    #[error("invalid time '{0}': use MM:SS, HH:MM:SS, MMSS or HHMMSS")]
    Invalid(String),
}

/// Normalize a clip boundary into the `M:S` / `H:M:S` form yt-dlp expects.
///
/// Colon forms with two or three numeric fields pass through unchanged.
/// Bare digit strings of length 4 or 6 are split into `MM:SS` and
/// `HH:MM:SS`. Everything else is rejected.
pub fn normalize_time(input: &str) -> Result<String, TimeError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(TimeError::Empty);
    }

    let invalid = || TimeError::Invalid(value.to_string());

    if value.contains(':') {
        let fields: Vec<&str> = value.split(':').collect();
        if !(2..=3).contains(&fields.len()) {
            return Err(invalid());
        }
        if fields
            .iter()
            .any(|field| field.is_empty() || !field.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(invalid());
        }
        return Ok(value.to_string());
    }

    if !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    match value.len() {
        4 => Ok(format!("{}:{}", &value[..2], &value[2..])),
        6 => Ok(format!("{}:{}:{}", &value[..2], &value[2..4], &value[4..])),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_forms() {
        assert_eq!(normalize_time("0130").unwrap(), "01:30");
        assert_eq!(normalize_time("012233").unwrap(), "01:22:33");
        assert_eq!(normalize_time(" 0005 ").unwrap(), "00:05");
    }

    #[test]
    fn test_colon_forms_pass_through() {
        assert_eq!(normalize_time("01:22:33").unwrap(), "01:22:33");
        assert_eq!(normalize_time("1:30").unwrap(), "1:30");
    }

    #[test]
    fn test_rejects_malformed_values() {
        assert!(normalize_time("1:2:3:4").is_err());
        assert!(normalize_time("12345").is_err());
        assert!(normalize_time("1m30").is_err());
        assert!(normalize_time("01::30").is_err());
        assert!(normalize_time("ab:cd").is_err());
        assert_eq!(normalize_time("   "), Err(TimeError::Empty));
    }
}
