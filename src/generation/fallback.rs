//! Rule-based answer used when no remote backend produced text.
//! Pure string work: no I/O, cannot fail, same input gives the same output.

const SUMMARY_SENTENCES: usize = 3;
pub const SUMMARY_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    Definition,
    Causal,
    Listing,
    Other,
}

const DEFINITION_CUES: &[&str] = &["what is", "what are", "define", "explain"];
const CAUSAL_CUES: &[&str] = &["how", "why", "when", "where"];
const LISTING_CUES: &[&str] = &["list", "show", "tell me about"];

pub fn classify(prompt: &str) -> QuestionKind {
    let lower = prompt.to_lowercase();
    let has_any = |cues: &[&str]| cues.iter().any(|cue| lower.contains(cue));

    if has_any(DEFINITION_CUES) {
        QuestionKind::Definition
    } else if has_any(CAUSAL_CUES) {
        QuestionKind::Causal
    } else if has_any(LISTING_CUES) {
        QuestionKind::Listing
    } else {
        QuestionKind::Other
    }
}

/// First few sentences of `context`, cut to `SUMMARY_MAX_CHARS` characters
/// (with a trailing "..." when cut). Empty when the context is blank.
pub fn summarize_context(context: &str) -> String {
    let context = context.trim();
    if context.is_empty() {
        return String::new();
    }

    let summary = context
        .split('.')
        .take(SUMMARY_SENTENCES)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(". ");

    if summary.chars().count() > SUMMARY_MAX_CHARS {
        let cut: String = summary.chars().take(SUMMARY_MAX_CHARS).collect();
        format!("{}...", cut)
    } else {
        summary
    }
}

pub fn synthesize(prompt: &str, context: &str) -> String {
    let summary = summarize_context(context);
    let kind = classify(prompt);

    if summary.is_empty() {
        return match kind {
            QuestionKind::Definition => "I can see you're asking for an explanation or definition. While I don't have access to advanced language models right now, the document context should contain relevant information to help answer your question.".to_string(),
            QuestionKind::Causal => "I understand you're looking for detailed information. The context from your uploaded documents contains relevant details that should address your question.".to_string(),
            QuestionKind::Listing => "I can see you're looking for specific information. Your uploaded documents should contain the details you're seeking.".to_string(),
            QuestionKind::Other => "I understand your question. While I'm currently operating with limited capabilities, the context from your uploaded documents should contain information relevant to your query. Please refer to the source documents for more detailed information.".to_string(),
        };
    }

    match kind {
        QuestionKind::Definition => format!(
            "Based on the provided context: {}. This appears to be relevant information that can help answer your question about the topic you mentioned.",
            summary
        ),
        QuestionKind::Causal => format!(
            "Based on the document context: {}. This information from your uploaded documents should help provide insights into your question.",
            summary
        ),
        QuestionKind::Listing => format!(
            "From the available information: {}. The documents you've uploaded contain additional details that are relevant to your request.",
            summary
        ),
        QuestionKind::Other => format!(
            "Based on your uploaded documents: {}. This context from your files should provide relevant information for your inquiry.",
            summary
        ),
    }
}
