//! Prompt templates for answer synthesis
//!
//! A template has exactly two slots, `{context}` and `{query}`. Rendering is
//! a single pass over pre-parsed segments, so slot-like text inside the
//! context or the query is never substituted again.

use kbase_core::{KbError, Result};

/// Default instruction: answer from the context only, admit when it is missing
pub const DEFAULT_TEMPLATE: &str = "You are a support assistant for a maintenance knowledge base.\n\
Answer the question using only the information in the context below.\n\
If the context does not contain the answer, say that you don't know.\n\
\n\
Context:\n\
{context}\n\
\n\
Question: {query}\n\
\n\
Answer:";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Context,
    Query,
}

/// Parsed two-slot prompt template
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template; both slots must appear exactly once and no other slot may
    pub fn new(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            literal.push_str(&rest[..start]);
            let after = &rest[start..];
            let Some(end) = after.find('}') else {
                literal.push_str(after);
                rest = "";
                break;
            };

            let slot = &after[1..end];
            let segment = match slot {
                "context" => Segment::Context,
                "query" => Segment::Query,
                other => {
                    return Err(KbError::Config(format!(
                        "prompt template has unknown slot {{{other}}}"
                    )))
                }
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);
            rest = &after[end + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for (slot, name) in [(Segment::Context, "context"), (Segment::Query, "query")] {
            let count = segments.iter().filter(|s| **s == slot).count();
            if count != 1 {
                return Err(KbError::Config(format!(
                    "prompt template must contain {{{name}}} exactly once, found {count}"
                )));
            }
        }

        Ok(Self { segments })
    }

    /// Fill the slots
    pub fn render(&self, context: &str, query: &str) -> String {
        let mut prompt = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => prompt.push_str(text),
                Segment::Context => prompt.push_str(context),
                Segment::Query => prompt.push_str(query),
            }
        }
        prompt
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE).unwrap_or_else(|_| Self {
            segments: vec![
                Segment::Context,
                Segment::Literal("\n\n".to_string()),
                Segment::Query,
            ],
        })
    }
}
