//! Summary prompt shared by every summarization provider.

pub(crate) const SUMMARY_GUIDELINES: &str = "Guidelines:\n\
- Start with a one-sentence overview of the main topic\n\
- Highlight key points, decisions, or action items\n\
- Preserve important names, dates, and specific details\n\
- Use bullet points for multiple items when appropriate\n\
- Keep the summary concise but comprehensive (aim for 20-30% of original length)\n\
- Maintain the original tone and context\n\n\
IMPORTANT: Output ONLY the summary itself. Do NOT include any introductory phrases \
like \"Here is a summary\" or concluding notes like \"Note:\". \
Start directly with the summary content.";

/// Human-readable language name for a language code.
pub(crate) fn language_name(code: &str) -> String {
    let name = match code.to_lowercase().as_str() {
        "auto" => "the same language as the original transcription",
        "ko" => "Korean",
        "en" => "English",
        "ja" => "Japanese",
        "zh" => "Chinese",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "it" => "Italian",
        "nl" => "Dutch",
        "pl" => "Polish",
        "tr" => "Turkish",
        "vi" => "Vietnamese",
        "th" => "Thai",
        "id" => "Indonesian",
        "ar" => "Arabic",
        "hi" => "Hindi",
        _ => return code.to_string(),
    };
    name.to_string()
}

/// System instruction for chat-style providers.
pub(crate) fn system_prompt(language: &str) -> String {
    format!(
        "You are an expert at summarizing transcribed audio/video content. \
         Create a clear, well-structured summary in {}.\n\n{}",
        language_name(language),
        SUMMARY_GUIDELINES
    )
}

pub(crate) fn user_prompt(text: &str) -> String {
    format!("Summarize the following transcription:\n\n{}", text)
}

/// Single-prompt form for completion-style providers.
pub(crate) fn completion_prompt(text: &str, language: &str) -> String {
    format!(
        "{}\n\nTranscription:\n{}\n\nSummary:",
        system_prompt(language),
        text
    )
}
