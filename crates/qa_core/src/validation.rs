use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{error::CoreError, profanity::ContentFilter};

pub const MAX_QUESTION_CHARS: usize = 500;
pub const MAX_SPEAKER_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Trims and checks question text. Used for both new and edited questions.
pub fn validate_question_text<'a>(
    text: &'a str,
    filter: &dyn ContentFilter,
) -> Result<&'a str, CoreError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CoreError::validation("question cannot be empty"));
    }
    if text.chars().count() > MAX_QUESTION_CHARS {
        return Err(CoreError::validation(format!(
            "question is too long (max {MAX_QUESTION_CHARS} characters)"
        )));
    }
    if filter.is_profane(text) {
        return Err(CoreError::validation(
            "question contains inappropriate language, please rephrase",
        ));
    }
    Ok(text)
}

pub fn required_field<'a>(value: &'a str, field: &str) -> Result<&'a str, CoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::validation(format!("{field} is required")));
    }
    Ok(value)
}

/// Accepts `data:image/<subtype>;base64,<payload>` urls only.
pub fn validate_speaker_image(image: &str) -> Result<(), CoreError> {
    if image.len() > MAX_SPEAKER_IMAGE_BYTES {
        return Err(CoreError::validation("speaker image is too large"));
    }

    let (subtype, payload) = image
        .strip_prefix("data:image/")
        .and_then(|rest| rest.split_once(";base64,"))
        .ok_or_else(|| CoreError::validation("speaker image must be a base64 image data url"))?;

    let subtype_ok = !subtype.is_empty()
        && subtype
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !subtype_ok {
        return Err(CoreError::validation("speaker image has an invalid media type"));
    }

    STANDARD
        .decode(payload)
        .map_err(|_| CoreError::validation("speaker image is not valid base64"))?;
    Ok(())
}
