//! Prompts for the two LLM stages.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing a formatting directive requires
//!    editing exactly one place.
//! 2. **Testability** — unit tests can inspect prompts directly without a
//!    live model, so prompt regressions are caught cheaply.

/// User prompt for the vision extraction step.
///
/// The `<image>` placeholder and grounding tag are part of the vision
/// model's expected input format; the image itself travels as a separate
/// content block in the same message.
pub const EXTRACT_PROMPT: &str = "<image>\n<|grounding|>Convert the document to markdown.";

/// System prompt for the refinement step, establishing the assistant's role.
pub const REFINE_SYSTEM_PROMPT: &str =
    "You are a specialist in converting OCR text into clean, structured Markdown.";

/// Build the user prompt for the refinement step.
///
/// Embeds the raw extraction and the fixed formatting directives. The
/// directives deliberately end with "output only the markdown" — without it
/// text models tend to prepend a sentence of commentary that would end up in
/// the persisted page file.
pub fn refine_user_prompt(raw_text: &str) -> String {
    format!(
        "The following text was extracted by OCR from one page of a document.\n\
         Convert it into clean, well-structured Markdown:\n\
         - Mark headings with #, ## and so on\n\
         - Represent lists with - or numbering\n\
         - Represent tables as Markdown tables\n\
         - Separate paragraphs with blank lines\n\
         - Keep the original language of the text\n\
         - Do not add any commentary; output only the Markdown\n\
         \n\
         Text:\n\
         {raw_text}"
    )
}
