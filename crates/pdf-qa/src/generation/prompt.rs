//! Prompt construction for grounded answers

/// Separator placed between retrieved chunks in the context block
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Fill the answer template with retrieved chunk texts and the question
pub fn build_prompt<S: AsRef<str>>(contexts: &[S], question: &str) -> String {
    let context = contexts
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    format!(
        "\nAnswer the question based only on the following context:\n\n\
         {}\n\n---\n\n\
         Answer the question based on the above context: {}\n",
        context, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt(&["first chunk", "second chunk"], "What is it?");
        assert_eq!(
            prompt,
            "\nAnswer the question based only on the following context:\n\n\
             first chunk\n\n---\n\nsecond chunk\n\n---\n\n\
             Answer the question based on the above context: What is it?\n"
        );
    }

    #[test]
    fn test_placeholders_in_context_untouched() {
        let prompt = build_prompt(&["literal {question} text"], "Q");
        assert!(prompt.contains("literal {question} text"));
        assert!(prompt.ends_with("above context: Q\n"));
    }
}
