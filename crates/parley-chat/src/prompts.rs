//! Prompt templates for every call made to the text-generation capability.

/// Exact reply meaning "the question can be answered as asked".
pub const CLARIFICATION_SENTINEL: &str = "NO_CLARIFICATION_NEEDED";

/// Classifier label for feedback that shows the user was satisfied.
pub const LABEL_USEFUL: &str = "USEFUL";

/// Classifier label for any other feedback.
pub const LABEL_NOT_USEFUL: &str = "NOT_USEFUL";

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "(none)"
    } else {
        text
    }
}

/// Ask whether `question` is ambiguous given the schema and prior conversation.
pub fn clarification(schema: &str, context: &str, question: &str) -> String {
    format!(
        "You are an expert in SQL databases and understand the semantic schema of the database below.

Database schema:
{schema}

A user asks a question in natural language. Decide whether the question is ambiguous or lacks \
information that cannot be deduced from the schema or from the previous conversation.
- If the question is ambiguous or can be read in more than one way, ask clarifying questions.
- If the question is clear, reply with exactly: {sentinel}
- If the question is vague but the previous conversation makes the intent clear, also reply with exactly: {sentinel}

The previous conversation matters: do not ask the user to repeat details they already gave.

Example of an ambiguous question:
User: How many did John handle?
Assistant:
What does \"handle\" mean here (orders, tickets, visits)?
Who is John? Do you have a last name or role?
Should the count be limited to a date range?

Example of a clear question:
User: How many orders did John Smith ship in 2023?
Assistant: {sentinel}

Write short, clear questions, one per line. Do not answer the question.

Previous conversation:
{context}

User: \"{question}\"

Is anything ambiguous or missing? If so, write short clarifying questions, one per line. \
Otherwise reply with EXACTLY: {sentinel}
",
        schema = schema,
        context = or_none(context),
        question = question,
        sentinel = CLARIFICATION_SENTINEL,
    )
}

/// The combined instruction handed to the execution agent.
pub fn execution_instruction(
    context: &str,
    schema: &str,
    question: &str,
    clarifications: &[String],
) -> String {
    let clarifications = if clarifications.is_empty() {
        "(none)".to_string()
    } else {
        clarifications
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Answer the user's question by querying the database.

Previous conversation:
{context}

Database schema:
{schema}

Question:
{question}

Clarifying questions asked earlier (the user's answers are in the conversation):
{clarifications}
",
        context = or_none(context),
        schema = schema,
        question = question,
        clarifications = clarifications,
    )
}

/// Ask for one read-only SQLite query satisfying `instruction`.
pub fn sql_generation(instruction: &str) -> String {
    format!(
        "You translate requests into SQLite queries.

{instruction}
Write a single read-only SQLite query (SELECT or WITH) that answers the question. \
Return only the SQL, with no explanation.
"
    )
}

/// Ask for a corrected query after an execution error.
pub fn correction(schema: &str, query: &str, error: &str) -> String {
    format!(
        "The following SQL request failed when executed.
Schema:
{schema}

Request:
{query}

Error:
{error}

Fix the query so that it is valid for the schema and return it. Return only the SQL.
"
    )
}

/// Ask for a jargon-free explanation of a raw query result.
pub fn explanation(context: &str, question: &str, schema: &str, result: &str) -> String {
    format!(
        "Explain to the user the result of a database query they asked for in natural language, \
without mentioning the database at all. Assume the user has no technical knowledge of SQL or \
databases and does not care about them; they only want to understand the answer.

Previous conversation:
{context}

Original question:
\"{question}\"

Database schema:
{schema}

Query result:
\"{result}\"

Explain in clear, concise, jargon-free language what this data means. Keep it short. \
End with a question asking whether the explanation was useful, such as \
\"Was this explanation helpful?\".
",
        context = or_none(context),
        question = question,
        schema = schema,
        result = result,
    )
}

/// Ask for a single-label verdict on user feedback.
pub fn classification(feedback: &str) -> String {
    format!(
        "You classify whether an explanation was useful to the user.

After receiving the explanation, the user replied:
\"{feedback}\"

If the reply shows the user is satisfied and has no remaining doubts, the explanation was useful; \
otherwise it was not.
Reply with exactly one of these labels and nothing else:
{useful}
{not_useful}
",
        feedback = feedback,
        useful = LABEL_USEFUL,
        not_useful = LABEL_NOT_USEFUL,
    )
}

/// Ask for a rewritten question given the conversation and the latest feedback.
pub fn reformulation(history: &str, feedback: &str) -> String {
    format!(
        "Below is a conversation in which a natural-language question was answered by turning it \
into SQL, followed by a final comment from the user.

Conversation:
{history}

The user clarified or corrected:
\"{feedback}\"

Write a new natural-language question that is clear, specific and complete, taking the whole \
conversation and the clarification into account.
Return only the new question, with no explanation.
",
        history = or_none(history),
        feedback = feedback,
    )
}
