//! Turns incremental generation events into full-text snapshots.

use generation_provider::{GenerationError, GenerationEvent};

/// The accumulated response at one point of a stream.
///
/// `accumulated_text` is always the full text so far, never a delta, so a
/// display can replace what it shows with the latest snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    pub accumulated_text: String,
    pub is_final: bool,
}

/// Accumulator for one in-flight response.
///
/// Every snapshot carries the trimmed accumulation, so snapshot lengths never
/// decrease and the last partial snapshot already equals the final text. A
/// failure discards everything accumulated so a partial response is never
/// mistaken for a result.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    accumulated: String,
    finished: bool,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Applies one event. Returns the snapshot to display, if any.
    ///
    /// Empty fragments produce no snapshot. Events after the end of the
    /// stream are ignored. A whole-text event that does not extend the text
    /// streamed so far is a malformed response.
    pub fn accept(
        &mut self,
        event: GenerationEvent,
    ) -> Result<Option<StreamState>, GenerationError> {
        if self.finished {
            return Ok(None);
        }

        match event {
            GenerationEvent::Fragment(fragment) => {
                if fragment.is_empty() {
                    return Ok(None);
                }
                self.accumulated.push_str(&fragment);
                Ok(Some(self.snapshot(false)))
            }
            // A one-shot transport delivers the whole text at once.
            GenerationEvent::Complete(text) => {
                if !text.trim().starts_with(self.accumulated.trim()) {
                    self.fail();
                    return Err(GenerationError::MalformedResponse(
                        "complete response contradicts the streamed text".to_string(),
                    ));
                }
                self.accumulated = text;
                Ok(Some(self.snapshot(false)))
            }
            GenerationEvent::Done => Ok(Some(self.finish())),
        }
    }

    /// Ends the stream, as on the terminator or when the source closes.
    pub fn finish(&mut self) -> StreamState {
        self.finished = true;
        self.snapshot(true)
    }

    fn snapshot(&self, is_final: bool) -> StreamState {
        StreamState {
            accumulated_text: self.accumulated.trim().to_string(),
            is_final,
        }
    }

    /// Ends the stream on a failure, dropping the partial text.
    pub fn fail(&mut self) {
        self.finished = true;
        self.accumulated.clear();
    }

    /// Lazily assembles `events` into snapshots.
    ///
    /// The sequence ends after the final snapshot or after the first error.
    pub fn consume<I>(events: I) -> AssembledStream<I::IntoIter>
    where
        I: IntoIterator<Item = Result<GenerationEvent, GenerationError>>,
    {
        AssembledStream {
            events: events.into_iter(),
            assembler: Self::new(),
        }
    }

    /// Runs `events` to completion, handing every snapshot to `on_state`,
    /// and returns the final trimmed text.
    pub fn drive<I, F>(events: I, mut on_state: F) -> Result<String, GenerationError>
    where
        I: IntoIterator<Item = Result<GenerationEvent, GenerationError>>,
        F: FnMut(&StreamState),
    {
        for state in Self::consume(events) {
            let state = state?;
            on_state(&state);
            if state.is_final {
                return Ok(state.accumulated_text);
            }
        }

        Err(GenerationError::MalformedResponse(
            "stream ended without a final state".to_string(),
        ))
    }
}

/// Iterator returned by [`StreamAssembler::consume`].
#[derive(Debug)]
pub struct AssembledStream<I> {
    events: I,
    assembler: StreamAssembler,
}

impl<I> AssembledStream<I> {
    /// Text accumulated so far; empty after a failure.
    pub fn accumulated(&self) -> &str {
        self.assembler.accumulated()
    }
}

impl<I> Iterator for AssembledStream<I>
where
    I: Iterator<Item = Result<GenerationEvent, GenerationError>>,
{
    type Item = Result<StreamState, GenerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.assembler.is_finished() {
            match self.events.next() {
                Some(Ok(event)) => match self.assembler.accept(event) {
                    Ok(Some(state)) => return Some(Ok(state)),
                    Ok(None) => {}
                    Err(error) => return Some(Err(error)),
                },
                Some(Err(error)) => {
                    self.assembler.fail();
                    return Some(Err(error));
                }
                None => return Some(Ok(self.assembler.finish())),
            }
        }

        None
    }
}
