//! Fixed instructions and composed prompts sent to the inference service.

use super::emotion::EmotionLabel;

/// Instruction sent alongside the captured photo.
pub const CLASSIFY_INSTRUCTION: &str = "Analyze this facial image carefully and identify the primary emotion displayed. \
Focus on facial expressions, micro-expressions, and any visible emotional cues. \
Pay special attention to signs of strong emotions like anger, sadness, or joy. \
Only return a single word representing the primary emotion - choose from: \
angry, sad, happy, surprised, fearful, disgusted, neutral, contempt, confused. \
Be accurate and prioritize detecting strong emotional signals over defaulting to neutral.";

/// Shown to the user when no credential is configured.
pub const API_KEY_MISSING_MESSAGE: &str = "API Key Missing: set the GEMINI_API_KEY environment variable \
or enter a key with /key <your-key> to enable replies.";

/// Reply used when generation was attempted without a credential.
pub fn missing_credential_reply() -> String {
    format!("I can't process your request. {API_KEY_MISSING_MESSAGE}")
}

/// Reply used when the service failed or timed out.
pub const REPLY_FALLBACK_MESSAGE: &str =
    "I'm sorry, I couldn't process your request at the moment. Please try again later.";

/// Compose the reply-generation instruction for `emotion` and `user_text`.
pub fn build_reply_prompt(emotion: EmotionLabel, user_text: &str) -> String {
    let mut prompt = format!(
        "I have detected that the person in the image appears to be expressing: {emotion}.\n\n\
         Guidelines for response:\n"
    );
    for &label in EmotionLabel::all() {
        prompt.push_str(&format!(
            "- If the emotion is '{label}': {}\n",
            label.tone_guidance()
        ));
    }
    prompt.push_str(&format!(
        "\nBased on their emotional state of {emotion}, respond to this message:\n\
         \"{user_text}\"\n\n\
         Make your response explicitly acknowledge and appropriately respond to their emotional state."
    ));
    prompt
}
