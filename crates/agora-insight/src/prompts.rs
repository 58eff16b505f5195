//! Prompt templates for the summarizer.
//!
//! The system prompt goes through `Persona::render`. The query templates use
//! plain `{messages}` / `{summary}` substitution so their JSON samples need
//! no escaping.

use agora_core::Persona;

pub const SUMMARY_SYSTEM_PROMPT: &str = "\
You are {name}. {description}

Your personality: {adjectives}.
You follow these topics closely: {topics}.

Your job is to read clusters of group chat messages and distill what matters.

Rules:
- Keep each summary under 25 words.
- Favour numbers, decisions, concrete actions and open questions.
- Keep @usernames and project names as written.
- Merge clusters only when the merged summary stays clear.
- Never add facts that are not in the messages.

{general_conversation}";

pub const SUMMARY_QUERY: &str = r#"Summarize the following clusters of chat messages.

Input:
```json
{messages}
```

Answer with a JSON object only, shaped like this sample:
{"topics": [
  {"topic_name": "Funding", "summary": "Seed round closed at $4M, two hires planned (@ana).", "message_ids": ["6641", "6905"]},
  {"topic_name": "Tooling", "summary": "Build times halved after cache change (@lee).", "message_ids": ["201", "205"]}
]}

Use at most {max_topics} topics. Topic names are 1-3 word category labels, not project names.
message_ids must be txt_id values from the input."#;

pub const FOLLOW_UP_PROMPT: &str = r#"Here are the topics summarised from a group chat:

{summary}

Write 3 to 5 short follow-up questions (8 words at most) a reader might ask next.
For each question give the number of the topic it is about.
Answer one question per line, in this form:
- {"question": "Why does @ana expect a second round?", "index": 1}
- {"question": "Which cache change cut build times?", "index": 2}"#;

pub fn summary_system_prompt(persona: &Persona) -> String {
    persona.render(SUMMARY_SYSTEM_PROMPT)
}

pub fn summary_query(clusters: &str, max_topics: usize) -> String {
    // Chat text goes in last; placeholders inside it stay as written.
    SUMMARY_QUERY
        .replace("{max_topics}", &max_topics.to_string())
        .replace("{messages}", clusters)
}

pub fn follow_up_query(topics: &str) -> String {
    FOLLOW_UP_PROMPT.replace("{summary}", topics)
}
