//! Conversation state and the loop's transition table
//!
//! One `ConversationState` is owned by one loop run. Phase changes only
//! happen through [`transition`], so every state the loop can reach is
//! listed in one table.

use crate::error::OrchestrationError;
use crate::models::{Message, ToolCallRequest, ToolResult, Verdict};
use crate::Result;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Reason,
    Tools,
    Reflect,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopEvent {
    ToolCallsRequested,
    DraftReady,
    ToolsCompleted,
    Approved,
    RevisionRequested,
    BoundExhausted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl fmt::Display for LoopEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub const ALL_PHASES: [Phase; 4] = [Phase::Reason, Phase::Tools, Phase::Reflect, Phase::End];

pub const ALL_EVENTS: [LoopEvent; 6] = [
    LoopEvent::ToolCallsRequested,
    LoopEvent::DraftReady,
    LoopEvent::ToolsCompleted,
    LoopEvent::Approved,
    LoopEvent::RevisionRequested,
    LoopEvent::BoundExhausted,
];

pub fn transition(phase: Phase, event: LoopEvent) -> Result<Phase> {
    use LoopEvent::*;
    use Phase::*;

    match (phase, event) {
        (Reason, ToolCallsRequested) => Ok(Tools),
        (Reason, DraftReady) => Ok(Reflect),
        (Tools, ToolsCompleted) => Ok(Reason),
        (Reflect, Approved) => Ok(End),
        (Reflect, RevisionRequested) => Ok(Reason),
        (Reflect, BoundExhausted) => Ok(End),
        (phase, event) => Err(OrchestrationError::InvalidTransition(format!(
            "{} cannot handle {}",
            phase, event
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct ConversationState {
    pub query_id: Uuid,
    messages: Vec<Message>,
    original_query: String,
    iteration_count: u32,
    max_iterations: u32,
    draft_answer: String,
    final_answer: Option<String>,
    needs_revision: bool,
    pending_requests: Vec<ToolCallRequest>,
    verdicts: Vec<Verdict>,
    phase: Phase,
}

impl ConversationState {
    /// `working_query` is what the model sees; `original_query` is what the
    /// user asked and what the draft is judged against.
    pub fn new(
        original_query: impl Into<String>,
        working_query: impl Into<String>,
        system_prompt: impl Into<String>,
        max_iterations: u32,
    ) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            messages: vec![Message::system(system_prompt), Message::user(working_query)],
            original_query: original_query.into(),
            iteration_count: 0,
            max_iterations,
            draft_answer: String::new(),
            final_answer: None,
            needs_revision: false,
            pending_requests: Vec::new(),
            verdicts: Vec::new(),
            phase: Phase::Reason,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn original_query(&self) -> &str {
        &self.original_query
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn draft(&self) -> &str {
        &self.draft_answer
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn needs_revision(&self) -> bool {
        self.needs_revision
    }

    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::End
    }

    pub fn within_bound(&self) -> bool {
        self.iteration_count < self.max_iterations
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn apply(&mut self, event: LoopEvent) -> Result<Phase> {
        self.phase = transition(self.phase, event)?;
        Ok(self.phase)
    }

    fn expect_phase(&self, expected: Phase, action: &str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(OrchestrationError::InvalidTransition(format!(
                "{} is only valid in {}, loop is in {}",
                action, expected, self.phase
            )))
        }
    }

    /// Enter a reasoning step. Counts the iteration and consumes the
    /// revision flag; returns whether this step is a revision.
    pub fn begin_reasoning(&mut self) -> Result<bool> {
        self.expect_phase(Phase::Reason, "begin_reasoning")?;
        self.iteration_count += 1;
        Ok(std::mem::take(&mut self.needs_revision))
    }

    pub fn request_tools(&mut self, assistant: Message, requests: Vec<ToolCallRequest>) -> Result<Phase> {
        self.expect_phase(Phase::Reason, "request_tools")?;
        self.messages.push(assistant);
        self.pending_requests = requests;
        self.apply(LoopEvent::ToolCallsRequested)
    }

    pub fn set_draft(&mut self, assistant: Message, draft: String) -> Result<Phase> {
        self.expect_phase(Phase::Reason, "set_draft")?;
        self.messages.push(assistant);
        self.draft_answer = draft;
        self.apply(LoopEvent::DraftReady)
    }

    pub fn take_pending_requests(&mut self) -> Vec<ToolCallRequest> {
        std::mem::take(&mut self.pending_requests)
    }

    pub fn record_tool_results(&mut self, results: Vec<(ToolCallRequest, ToolResult)>) -> Result<Phase> {
        self.expect_phase(Phase::Tools, "record_tool_results")?;
        for (request, result) in &results {
            self.messages.push(Message::tool_result(request, result));
        }
        self.apply(LoopEvent::ToolsCompleted)
    }

    pub fn approve(&mut self) -> Result<Phase> {
        let phase = self.apply(LoopEvent::Approved)?;
        self.verdicts.push(Verdict::Approve);
        self.final_answer = Some(self.draft_answer.clone());
        Ok(phase)
    }

    /// Rejected with budget left: clear the draft and go back to reasoning
    pub fn request_revision(&mut self) -> Result<Phase> {
        let phase = self.apply(LoopEvent::RevisionRequested)?;
        self.verdicts.push(Verdict::Revise);
        self.needs_revision = true;
        self.draft_answer.clear();
        Ok(phase)
    }

    /// Rejected with no budget left: release the best draft as is
    pub fn exhaust(&mut self) -> Result<Phase> {
        let phase = self.apply(LoopEvent::BoundExhausted)?;
        self.verdicts.push(Verdict::Revise);
        self.final_answer = Some(self.draft_answer.clone());
        Ok(phase)
    }
}
