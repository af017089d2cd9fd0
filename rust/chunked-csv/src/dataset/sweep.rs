// rust/chunked-csv/src/dataset/sweep.rs

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SweepConfig;
use crate::error::{Result, ReaderError};

use super::traits::{DataDeserializer, SequenceChunk, SequenceInfo};

/// One entry handed out by a [`Sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepItem {
    Sequence(SequenceInfo),
    /// Marks the end of a full pass over the data.
    EndOfSweep,
}

/// Saved position of a [`Sweep`].
///
/// Records the position before the current chunk was loaded and how many
/// of that chunk's items were already handed out, so restoring reloads the
/// chunk and skips them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepState {
    pub chunk_position: u32,
    pub sequence_position: u64,
    pub sweeps_completed: u64,
    pub consumed: u64,
}

impl SweepState {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| {
            ReaderError::serialization(format!("failed to encode sweep state: {e}"))
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| {
            ReaderError::serialization(format!("failed to decode sweep state: {e}"))
        })
    }
}

/// Walks the chunks of a deserializer in file order, without randomization.
///
/// Sequences are decimated across workers by their position within the
/// sweep: a worker keeps the sequences where
/// `position % number_of_workers == worker_rank`. Every pass ends with a
/// [`SweepItem::EndOfSweep`] marker and the sweep stops after
/// `max_sweeps` passes.
///
/// Only the chunk currently being handed out is kept in memory.
pub struct Sweep<D: DataDeserializer> {
    deserializer: D,
    chunk_ids: Vec<u32>,
    worker_rank: u64,
    number_of_workers: u64,
    max_sweeps: u64,

    chunk_position: u32,
    sequence_position: u64,
    sweeps_completed: u64,

    window: VecDeque<SweepItem>,
    window_origin: SweepState,
    consumed: u64,
    current_chunk: Option<D::Chunk>,
}

impl<D: DataDeserializer> Sweep<D> {
    /// Creates a sweep positioned at the start of the first pass.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::Config` if the sweep options are invalid.
    pub fn new(deserializer: D, config: &SweepConfig) -> Result<Self> {
        config.validate()?;
        let chunk_ids = deserializer.chunk_infos().iter().map(|c| c.id).collect();

        Ok(Self {
            deserializer,
            chunk_ids,
            worker_rank: config.worker_rank as u64,
            number_of_workers: config.number_of_workers as u64,
            max_sweeps: config.max_sweeps as u64,
            chunk_position: 0,
            sequence_position: 0,
            sweeps_completed: 0,
            window: VecDeque::new(),
            window_origin: SweepState::default(),
            consumed: 0,
            current_chunk: None,
        })
    }

    pub fn deserializer(&self) -> &D {
        &self.deserializer
    }

    pub fn into_inner(self) -> D {
        self.deserializer
    }

    /// The chunk the most recent sequence belongs to.
    pub fn current_chunk(&self) -> Option<&D::Chunk> {
        self.current_chunk.as_ref()
    }

    pub fn sweeps_completed(&self) -> u64 {
        self.sweeps_completed
    }

    /// Returns the next item, or `None` once every sweep has finished.
    ///
    /// A file without chunks yields nothing, not even an end marker.
    ///
    /// # Errors
    ///
    /// Propagates chunk read failures. The sweep position is left unchanged,
    /// so the call can be retried.
    pub fn next_item(&mut self) -> Result<Option<SweepItem>> {
        loop {
            if let Some(item) = self.pop() {
                return Ok(Some(item));
            }
            if self.chunk_ids.is_empty() || self.sweeps_completed >= self.max_sweeps {
                return Ok(None);
            }
            self.refill()?;
        }
    }

    /// Snapshot of the current position.
    pub fn state(&self) -> SweepState {
        SweepState {
            consumed: self.consumed,
            ..self.window_origin
        }
    }

    /// Moves the sweep to a saved position.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::Config` if the state does not fit this data,
    /// and propagates the read of the chunk being resumed.
    pub fn restore(&mut self, state: SweepState) -> Result<()> {
        let chunk_count = self.chunk_ids.len();
        if chunk_count == 0 && state.consumed > 0 {
            return Err(ReaderError::config(format!(
                "sweep state skips {} items but the data has no chunks",
                state.consumed
            )));
        }
        if chunk_count > 0 && state.chunk_position as usize >= chunk_count {
            return Err(ReaderError::config(format!(
                "sweep state chunk position {} is out of range for {chunk_count} chunks",
                state.chunk_position
            )));
        }

        self.chunk_position = state.chunk_position;
        self.sequence_position = state.sequence_position;
        self.sweeps_completed = state.sweeps_completed;
        self.window.clear();
        self.window_origin = SweepState {
            consumed: 0,
            ..state
        };
        self.consumed = 0;
        self.current_chunk = None;

        if state.consumed > 0 {
            self.refill()?;
            for _ in 0..state.consumed {
                if self.pop().is_none() {
                    return Err(ReaderError::config(format!(
                        "sweep state skips {} items but chunk position {} has fewer",
                        state.consumed, state.chunk_position
                    )));
                }
            }
        }

        debug!(?state, "restored sweep state");
        Ok(())
    }

    fn pop(&mut self) -> Option<SweepItem> {
        let item = self.window.pop_front()?;
        self.consumed += 1;
        if item == SweepItem::EndOfSweep {
            self.sweeps_completed += 1;
            info!(sweeps_completed = self.sweeps_completed, "sweep finished");
        }
        Some(item)
    }

    /// Loads the chunk at the current position and queues its sequences.
    fn refill(&mut self) -> Result<()> {
        let position = self.chunk_position;
        let chunk_id = self.chunk_ids[position as usize];
        let chunk = self.deserializer.get_chunk(chunk_id)?;

        let origin = SweepState {
            chunk_position: position,
            sequence_position: self.sequence_position,
            sweeps_completed: self.sweeps_completed,
            consumed: 0,
        };

        let mut sequence_position = self.sequence_position;
        let mut window = VecDeque::with_capacity(chunk.sequence_count() + 1);
        for sequence in chunk.sequence_infos() {
            if sequence_position % self.number_of_workers == self.worker_rank {
                window.push_back(SweepItem::Sequence(sequence));
            }
            sequence_position += 1;
        }

        let is_last = position as usize + 1 == self.chunk_ids.len();
        if is_last {
            window.push_back(SweepItem::EndOfSweep);
            sequence_position = 0;
        }

        debug!(
            chunk_id,
            kept = window.len(),
            sequences = chunk.sequence_count(),
            "loaded sweep window"
        );

        self.window = window;
        self.window_origin = origin;
        self.consumed = 0;
        self.sequence_position = sequence_position;
        self.chunk_position = (position + 1) % self.chunk_ids.len() as u32;
        self.current_chunk = Some(chunk);
        Ok(())
    }
}

impl<D: DataDeserializer> Iterator for Sweep<D> {
    type Item = Result<SweepItem>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_item() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
