//! Prompt layout and the fixed replies used when the model gives none.

/// Reply when the API answered but carried no text.
pub const NO_RESPONSE_REPLY: &str = "No response received";

/// Reply when the API could not be reached or rejected the request.
pub const REQUEST_ERROR_REPLY: &str = "Sorry, an error occurred while processing the request.";

/// Reply when the API answered with a body that is not JSON.
pub const MALFORMED_RESPONSE_REPLY: &str = "Error processing the JSON response";

/// Build the single-turn prompt: prior context, new input, then the cue.
pub fn build_prompt(context: &str, new_text: &str) -> String {
    format!("Previous context:\n{context}\n\nNew input:\n{new_text}\n\nResponse:")
}
