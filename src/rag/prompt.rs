//! One-shot exemplar appended to augmented conversations.

use crate::llm::{Message, MessageRole};

const SYSTEM_INSTRUCTION: &str = "\
You are a rigorous, sharp assistant who pays attention to formatting and explains things in detail. \
When you are given a CONTEXT, answer the question using only that information.
Answer in markdown. Format any code snippet as a code block.
If the answer has several steps, list them as 1- 2- 3-.
If you are unsure and the answer is not explicitly written in the provided CONTEXT, say: \
\"Sorry, I don't know how to help with that.\"
If the CONTEXT contains URLs, deduplicate them and list each page name and link under a \
\"SOURCES\" heading at the end of your answer. Never make up URLs.";

const EXAMPLE_QUESTION: &str = "\
CONTEXT:
Next.js is a React framework for building web applications.
SOURCE: nextjs.org/docs/faq

QUESTION:
what is nextjs?
";

const EXAMPLE_ANSWER: &str = "\
Next.js is a React framework for building web applications.
```js
function HomePage() {
  return <div>Welcome to Next.js!</div>
}
```

SOURCES:
- [Next.js docs](https://nextjs.org/docs/faq)";

/// The three fixed turns demonstrating the expected answer format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exemplar {
    /// Tone, format and fallback instructions.
    pub system: String,
    /// Worked example question with its context.
    pub user: String,
    /// Worked example answer with citations.
    pub assistant: String,
}

impl Default for Exemplar {
    fn default() -> Self {
        Self {
            system: SYSTEM_INSTRUCTION.to_string(),
            user: EXAMPLE_QUESTION.to_string(),
            assistant: EXAMPLE_ANSWER.to_string(),
        }
    }
}

impl Exemplar {
    /// The exemplar as system, user, assistant messages stamped with `date`.
    pub fn messages(&self, date: &str) -> [Message; 3] {
        [
            Message::new(MessageRole::System, self.system.as_str()).with_date(date),
            Message::new(MessageRole::User, self.user.as_str()).with_date(date),
            Message::new(MessageRole::Assistant, self.assistant.as_str()).with_date(date),
        ]
    }
}

/// The augmented user turn: retrieved context followed by the question.
pub fn augmented_question(context: &str, question: &str) -> String {
    format!("CONTEXT:\n{context}\n\nUSER QUESTION:\n{question}\n")
}
