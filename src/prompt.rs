//! Prompt construction and reply interpretation.
//!
//! The model is asked to answer from the retrieved context only and to reply
//! with a JSON object `{"answer": "...", "has_sufficient_context": true}`.
//! Replies that are not valid JSON are taken verbatim as the answer, and a
//! list of decline phrases decides whether the context was sufficient.

use serde::Deserialize;

use crate::models::{RetrievalResult, SourceRef};

/// Phrases that mean the model declined to answer from the context.
pub const DECLINE_PHRASES: [&str; 7] = [
    "i don't know",
    "i do not know",
    "no information",
    "not sure",
    "unable to find",
    "i cannot answer",
    "i don't have that information",
];

const CONTEXT_NOT_PROVIDED: &str = "context does not provide any information";

const TEMPLATE: &str = "Use the pieces of information provided in the context to answer the user's question.
If you don't know the answer, say that you don't know. Do not hallucinate.

Respond with a single JSON object and nothing else:
{\"answer\": \"<your answer>\", \"has_sufficient_context\": <true if the context contains the answer, otherwise false>}

Context:
{context}

Question: {question}

Answer:";

/// Structured answer produced by a synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Answer {
    pub text: String,
    pub has_sufficient_context: bool,
}

#[derive(Deserialize)]
struct StructuredReply {
    answer: String,
    #[serde(default)]
    has_sufficient_context: Option<bool>,
}

/// Render the retrieved chunks as numbered, source-labelled context entries.
pub fn format_context(context: &RetrievalResult) -> String {
    if context.is_empty() {
        return "(no relevant context was found)".to_string();
    }
    context
        .hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let source = SourceRef::from(&hit.chunk.metadata);
            format!(
                "[{}] ({}, page {})\n{}",
                i + 1,
                source.file_name(),
                source.page_label(),
                hit.chunk.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fill the fixed template with context and question.
pub fn build_prompt(question: &str, context: &RetrievalResult) -> String {
    TEMPLATE
        .replace("{context}", &format_context(context))
        .replace("{question}", question.trim())
}

/// Interpret a raw model reply.
pub fn parse_answer(raw: &str) -> Answer {
    if let Some(structured) = parse_structured(raw) {
        let has_sufficient_context = structured
            .has_sufficient_context
            .unwrap_or_else(|| !is_decline(&structured.answer));
        return Answer {
            text: structured.answer.trim().to_string(),
            has_sufficient_context,
        };
    }

    let text = raw.trim().to_string();
    Answer {
        has_sufficient_context: !is_decline(&text),
        text,
    }
}

/// Models sometimes wrap JSON in a fenced code block; accept that too.
fn parse_structured(raw: &str) -> Option<StructuredReply> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).ok()
}

/// True when `text` contains one of the decline phrases (case-insensitive).
pub fn is_decline(text: &str) -> bool {
    let lower = text.to_lowercase().replace('\u{2019}', "'");
    lower.contains(CONTEXT_NOT_PROVIDED) || DECLINE_PHRASES.iter().any(|p| lower.contains(p))
}

/// Answer text followed, when the context was sufficient, by the cited sources.
///
/// ```rust
/// use neurorag::models::SourceRef;
/// use neurorag::prompt::{render_reply, Answer};
///
/// let answer = Answer { text: "Two years.".into(), has_sufficient_context: true };
/// let sources = vec![SourceRef { source_path: "data/warranty.pdf".into(), page_number: Some(2) }];
/// assert_eq!(
///     render_reply(&answer, &sources),
///     "Two years.\n\n**Source Documents:**\n- Page 2 from warranty.pdf"
/// );
/// ```
pub fn render_reply(answer: &Answer, sources: &[SourceRef]) -> String {
    if !answer.has_sufficient_context || sources.is_empty() {
        return answer.text.clone();
    }
    let lines: Vec<String> = sources.iter().map(|s| format!("- {}", s)).collect();
    format!("{}\n\n**Source Documents:**\n{}", answer.text, lines.join("\n"))
}
