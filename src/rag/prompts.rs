use crate::llm::ChatMessage;

/// Asks the model to fold the chat history into a self-contained question.
pub fn standalone_question(query: &str, history: &[ChatMessage]) -> String {
    let rendered: Vec<String> = history
        .iter()
        .map(|turn| format!("{}: {}", turn.role, turn.content))
        .collect();

    format!(
        "Given the chat history and a follow up question, rephrase it to be a standalone question.\n\n\
         History:\n{}\n\n\
         Follow Up: {}\n\
         Standalone Question:",
        rendered.join("\n"),
        query
    )
}

pub fn answer(query: &str, chunks: &[String]) -> String {
    format!(
        "You are a helpful AI assistant that answers user questions based on the provided document context.\n\n\
         - For specific questions, find the answer in the provided context and respond directly.\n\n\
         Context from the document:\n\
         ---\n\
         {}\n\
         ---\n\n\
         Question: {}",
        chunks.join("\n\n"),
        query
    )
}

/// Asks for the one sentence of `source` that best supports `answer`.
pub fn supporting_snippet(answer: &str, source: &str) -> String {
    format!(
        "From the 'Source Text' below, extract the single sentence that is most relevant to the given 'Answer'. \
         Return only that sentence.\n\n\
         Answer:\n\"{}\"\n\n\
         Source Text:\n\"{}\"\n\n\
         Most Relevant Sentence:",
        answer, source
    )
}
