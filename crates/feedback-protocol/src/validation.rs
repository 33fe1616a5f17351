use thiserror::Error;

pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MIN_CHARS: usize = 10;
pub const DESCRIPTION_MAX_CHARS: usize = 5000;

/// Field-specific rejection of a submission, raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("Title must be between 3 and 200 characters")]
    Title { len: usize },
    #[error("Description must be between 10 and 5000 characters")]
    Description { len: usize },
}

impl SubmissionError {
    pub fn field(&self) -> &'static str {
        match self {
            SubmissionError::Title { .. } => "title",
            SubmissionError::Description { .. } => "description",
        }
    }

    pub fn heading(&self) -> &'static str {
        match self {
            SubmissionError::Title { .. } => "Invalid title",
            SubmissionError::Description { .. } => "Invalid description",
        }
    }
}

/// Lengths are counted in Unicode scalar values. The title is checked first.
pub fn validate_submission(title: &str, description: &str) -> Result<(), SubmissionError> {
    let title_len = title.chars().count();
    if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&title_len) {
        return Err(SubmissionError::Title { len: title_len });
    }

    let description_len = description.chars().count();
    if !(DESCRIPTION_MIN_CHARS..=DESCRIPTION_MAX_CHARS).contains(&description_len) {
        return Err(SubmissionError::Description {
            len: description_len,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = "Long enough description";

    #[test]
    fn title_bounds_are_inclusive() {
        assert!(validate_submission("abc", DESCRIPTION).is_ok());
        assert!(validate_submission(&"t".repeat(200), DESCRIPTION).is_ok());
        assert_eq!(
            validate_submission("ab", DESCRIPTION),
            Err(SubmissionError::Title { len: 2 })
        );
        assert_eq!(
            validate_submission(&"t".repeat(201), DESCRIPTION),
            Err(SubmissionError::Title { len: 201 })
        );
    }

    #[test]
    fn description_bounds_are_inclusive() {
        assert!(validate_submission("Title", &"d".repeat(10)).is_ok());
        assert!(validate_submission("Title", &"d".repeat(5000)).is_ok());
        assert_eq!(
            validate_submission("Title", "too short"),
            Err(SubmissionError::Description { len: 9 })
        );
        assert_eq!(
            validate_submission("Title", &"d".repeat(5001)),
            Err(SubmissionError::Description { len: 5001 })
        );
    }

    #[test]
    fn multibyte_characters_count_once() {
        assert!(validate_submission("日本語", DESCRIPTION).is_ok());
    }

    #[test]
    fn errors_name_the_field() {
        let err = validate_submission("", DESCRIPTION).unwrap_err();
        assert_eq!(err.field(), "title");
        assert_eq!(err.heading(), "Invalid title");
        assert_eq!(err.to_string(), "Title must be between 3 and 200 characters");
    }
}
