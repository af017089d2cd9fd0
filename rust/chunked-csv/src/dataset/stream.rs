// rust/chunked-csv/src/dataset/stream.rs

use std::ops::Range;

use crate::config::{validate_streams, StreamSpec};
use crate::error::Result;

/// Element type of every stream. Columns are always coerced to f32.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ElementType {
    #[default]
    Float32,
}

/// Immutable description of one stream exposed to the minibatch loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    name: String,
    index: usize,
    element_type: ElementType,
    shape: Vec<usize>,
}

impl StreamDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of this stream in the row layout.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of columns this stream occupies, the product of its shape.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Maps each stream to a contiguous column range of a row.
///
/// Stream `i` owns columns `offsets[i]..offsets[i + 1]`, so the streams
/// partition the row in declaration order.
#[derive(Debug, Clone)]
pub struct StreamLayout {
    streams: Vec<StreamDescriptor>,
    offsets: Vec<usize>,
}

impl StreamLayout {
    /// Builds the layout from stream specs.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::Config` if there are no streams, a name is
    /// empty or repeated, or a shape has a zero dimension.
    pub fn new(specs: &[StreamSpec]) -> Result<Self> {
        validate_streams(specs)?;

        let mut offsets = Vec::with_capacity(specs.len() + 1);
        offsets.push(0);

        let streams = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let end = offsets[index] + spec.element_count();
                offsets.push(end);
                StreamDescriptor {
                    name: spec.name.clone(),
                    index,
                    element_type: ElementType::Float32,
                    shape: spec.shape.clone(),
                }
            })
            .collect();

        Ok(Self { streams, offsets })
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    /// Looks a stream up by name.
    pub fn stream(&self, name: &str) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.name == name)
    }

    /// Total number of columns a row must have.
    pub fn total_columns(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    /// Column range of the stream at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a stream of this layout.
    pub fn columns(&self, index: usize) -> Range<usize> {
        self.offsets[index]..self.offsets[index + 1]
    }
}
