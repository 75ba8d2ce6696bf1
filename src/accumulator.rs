//! Delta accumulation logic for streaming responses.

use crate::types::{Part, ToolCall};
use crate::Response;

/// Accumulates streaming deltas into a complete response.
///
/// Consecutive text deltas are merged into one text part, consecutive
/// reasoning deltas into one thought part. A tool call delta whose id matches
/// an already-seen call extends that call's arguments.
#[derive(Debug, Default, Clone)]
pub struct ResponseAccumulator {
    response: Response,
}

impl ResponseAccumulator {
    /// Create a new response accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta into the accumulation.
    pub fn process(&mut self, delta: &Response) {
        for part in &delta.parts {
            self.push_part(part);
        }
        if delta.finish_reason.is_some() {
            self.response.finish_reason = delta.finish_reason.clone();
        }
        if delta.usage.is_some() {
            self.response.usage = delta.usage.clone();
        }
    }

    fn push_part(&mut self, part: &Part) {
        let parts = &mut self.response.parts;
        match (parts.last_mut(), part) {
            (Some(Part::Text(content)), Part::Text(delta)) => content.push_str(delta),
            (Some(Part::Thought(content)), Part::Thought(delta)) => content.push_str(delta),
            (_, Part::ToolCall(call)) if !call.id.is_empty() => {
                let existing = parts.iter_mut().find_map(|existing| match existing {
                    Part::ToolCall(existing) if existing.id == call.id => Some(existing),
                    _ => None,
                });
                match existing {
                    Some(existing) => {
                        if existing.name.is_empty() {
                            existing.name = call.name.clone();
                        }
                        existing.arguments.push_str(&call.arguments);
                    }
                    None => parts.push(part.clone()),
                }
            }
            _ => parts.push(part.clone()),
        }
    }

    /// The accumulated text so far.
    pub fn current_text(&self) -> String {
        self.response.text()
    }

    /// The accumulated reasoning so far.
    pub fn current_thought(&self) -> String {
        self.response.thought()
    }

    /// The tool calls seen so far.
    pub fn completed_tool_calls(&self) -> Vec<ToolCall> {
        self.response.tool_calls().into_iter().cloned().collect()
    }

    /// A view of everything accumulated so far.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Finalize and return the complete response.
    pub fn finalize(self) -> Response {
        self.response
    }
}
