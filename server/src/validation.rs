use crate::error::ApiError;

/// Maximum prompt length for chat requests
const MAX_PROMPT_LENGTH: usize = 8000;
/// Maximum text length for TTS requests
const MAX_TEXT_LENGTH: usize = 5000;

/// Validate chat request
pub fn validate_prompt(prompt: &str) -> Result<(), ApiError> {
    if prompt.trim().is_empty() {
        return Err(ApiError::InvalidInput("Prompt cannot be empty".to_string()));
    }
    if prompt.chars().count() > MAX_PROMPT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Prompt too long (max {} characters)",
            MAX_PROMPT_LENGTH
        )));
    }
    Ok(())
}

/// Validate TTS request
pub fn validate_tts_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("No text provided".to_string()));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}
