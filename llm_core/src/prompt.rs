use crate::retrieval::ContextSnippet;

/// Render retrieved snippets as numbered source blocks.
pub fn format_context(snippets: &[ContextSnippet]) -> String {
    snippets
        .iter()
        .enumerate()
        .map(|(i, snippet)| format!("[Source #{}]\n{}\n\n", i + 1, snippet.text))
        .collect()
}

/// Build the final prompt sent to the model from the user's question and the
/// rendered context (which may be empty).
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "\nUse the following context to answer the user's question.\n\
         If you cannot find the answer, say you don't know.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         User's Question:\n\
         {question}\n\
         \n\
         Answer:\n"
    )
}
