use std::error::Error as StdError;
use std::fmt::{self, Display};

use coach_relay_model::{ToolCallDelta, ToolCallRequest};

/// Returned when a delta refers to a call that was already closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnexpectedIndex {
    /// The index carried by the delta.
    pub index: u32,
    /// The index of the call being accumulated at that time.
    pub active: u32,
}

impl Display for UnexpectedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tool call delta for index {} arrived while accumulating index {}",
            self.index, self.active
        )
    }
}

impl StdError for UnexpectedIndex {}

#[derive(Debug)]
struct PartialToolCall {
    index: u32,
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl PartialToolCall {
    #[inline]
    fn open(index: u32) -> Self {
        Self {
            index,
            id: None,
            name: None,
            arguments: String::new(),
        }
    }

    #[inline]
    fn apply(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id {
            self.id = Some(id);
        }
        if let Some(name) = delta.name {
            self.name = Some(name);
        }
        if let Some(arguments) = delta.arguments {
            self.arguments.push_str(&arguments);
        }
    }

    #[inline]
    fn close(self) -> ToolCallRequest {
        ToolCallRequest {
            id: self.id.unwrap_or_default(),
            index: self.index,
            name: self.name.unwrap_or_default(),
            arguments: self.arguments,
        }
    }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    NoActiveCall,
    Accumulating(PartialToolCall),
}

/// Rebuilds tool call requests from streamed deltas.
///
/// Deltas of one call share an index, and calls of a parallel batch
/// arrive one after another with ascending indices. A delta with a new
/// index closes the call being accumulated and opens another one. The last
/// call is closed by [`finish`](Self::finish), since streams carry no
/// explicit end marker for calls.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    state: State,
    finalized: Vec<ToolCallRequest>,
}

impl ToolCallAccumulator {
    /// Feeds the next delta in arrival order.
    pub fn push(&mut self, delta: ToolCallDelta) -> Result<(), UnexpectedIndex> {
        match &mut self.state {
            State::Accumulating(call) if call.index == delta.index => {
                call.apply(delta);
                return Ok(());
            }
            State::Accumulating(call) if delta.index < call.index => {
                return Err(UnexpectedIndex {
                    index: delta.index,
                    active: call.index,
                });
            }
            _ => {}
        }

        self.close_active();
        trace!("accumulating tool call at index {}", delta.index);
        let mut call = PartialToolCall::open(delta.index);
        call.apply(delta);
        self.state = State::Accumulating(call);
        Ok(())
    }

    /// Closes the last call and returns all calls in index order.
    pub fn finish(mut self) -> Vec<ToolCallRequest> {
        self.close_active();
        self.finalized
    }

    fn close_active(&mut self) {
        if let State::Accumulating(call) = std::mem::take(&mut self.state) {
            let call = call.close();
            trace!("closed tool call {} ({}): {}", call.id, call.name, call.arguments);
            self.finalized.push(call);
        }
    }
}
