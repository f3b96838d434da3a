//! Pure input validation and normalization for task fields.
//!
//! Nothing here touches storage. Limits come from an explicit
//! [`ValidationLimits`] value rather than being baked into the functions.

use taskdeck_proto::task::{
    MAX_TASK_DESCRIPTION_LENGTH, MAX_TASK_TITLE_LENGTH, TaskStatus, Timestamp,
};
use thiserror::Error;

/// Field length limits applied by the validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Maximum title length in characters (measured before trimming).
    pub max_title_len: usize,
    /// Maximum description length in characters.
    pub max_description_len: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_title_len: MAX_TASK_TITLE_LENGTH,
            max_description_len: MAX_TASK_DESCRIPTION_LENGTH,
        }
    }
}

/// A rejected field value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Title is empty or whitespace-only.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Title exceeds the configured maximum.
    #[error("task title cannot exceed {max} characters")]
    TitleTooLong {
        /// Configured maximum.
        max: usize,
    },
    /// Description exceeds the configured maximum.
    #[error("task description cannot exceed {max} characters")]
    DescriptionTooLong {
        /// Configured maximum.
        max: usize,
    },
    /// Due date is not a usable timestamp.
    #[error("invalid due date timestamp")]
    InvalidDueDate,
    /// The requested status change is not allowed.
    #[error("cannot move task from {from} to {to}")]
    StatusTransition {
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },
}

/// An accepted value that the caller should still hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationWarning {
    /// The due date lies before the current time.
    #[error("due date is in the past")]
    DueDateInPast,
}

impl ValidationLimits {
    /// Checks a raw, untrimmed title.
    ///
    /// # Errors
    ///
    /// [`ValidationError::TitleEmpty`] if nothing remains after trimming,
    /// [`ValidationError::TitleTooLong`] if the untrimmed title is too long.
    pub fn validate_title(&self, raw: &str) -> Result<(), ValidationError> {
        if raw.trim().is_empty() {
            return Err(ValidationError::TitleEmpty);
        }
        if raw.chars().count() > self.max_title_len {
            return Err(ValidationError::TitleTooLong {
                max: self.max_title_len,
            });
        }
        Ok(())
    }

    /// Checks an optional description.
    ///
    /// # Errors
    ///
    /// [`ValidationError::DescriptionTooLong`] if it exceeds the maximum.
    pub fn validate_description(&self, raw: Option<&str>) -> Result<(), ValidationError> {
        match raw {
            Some(text) if text.chars().count() > self.max_description_len => {
                Err(ValidationError::DescriptionTooLong {
                    max: self.max_description_len,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Checks an optional raw due date and converts it to a [`Timestamp`].
///
/// Fractional milliseconds are truncated. A due date before `now` is
/// accepted with [`ValidationWarning::DueDateInPast`].
///
/// # Errors
///
/// [`ValidationError::InvalidDueDate`] for NaN, infinite, negative, or
/// out-of-range values.
pub fn validate_due_date(
    raw: Option<f64>,
    now: Timestamp,
) -> Result<(Option<Timestamp>, Option<ValidationWarning>), ValidationError> {
    let Some(millis) = raw else {
        return Ok((None, None));
    };
    let due = to_timestamp(millis).ok_or(ValidationError::InvalidDueDate)?;
    let warning = (due < now).then_some(ValidationWarning::DueDateInPast);
    Ok((Some(due), warning))
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn to_timestamp(millis: f64) -> Option<Timestamp> {
    // 2^64 as f64; anything at or above it does not fit.
    const LIMIT: f64 = 18_446_744_073_709_551_616.0;
    if !millis.is_finite() || millis < 0.0 || millis >= LIMIT {
        return None;
    }
    Some(Timestamp::from_millis(millis.trunc() as u64))
}

/// Checks whether a task may move from `from` to `to`.
///
/// Every transition is currently allowed.
///
/// # Errors
///
/// Reserved for workflow rules; never fails today.
#[allow(clippy::missing_const_for_fn, clippy::unnecessary_wraps)]
pub fn validate_status_transition(from: TaskStatus, to: TaskStatus) -> Result<(), ValidationError> {
    let _ = (from, to);
    Ok(())
}

/// Trims a title and collapses internal whitespace runs to a single space.
#[must_use]
pub fn normalize_title(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trims a description. Absent stays absent.
#[must_use]
pub fn normalize_description(raw: Option<&str>) -> Option<String> {
    raw.map(|text| text.trim().to_string())
}
