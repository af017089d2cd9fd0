use std::io::{Cursor, Read, Seek, SeekFrom};

use chunked_csv::{
    ChunkReader, ChunkingConfig, ReaderError, SequenceChunk, StorageReader, StreamSpec,
};
use proptest::prelude::*;

const COLUMNS: usize = 3;

struct MemoryReader {
    data: Cursor<Vec<u8>>,
    size: u64,
}

impl MemoryReader {
    fn new(data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self {
            data: Cursor::new(data),
            size,
        }
    }
}

impl Read for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.data.read(buf)
    }
}

impl Seek for MemoryReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.data.seek(pos)
    }
}

impl StorageReader for MemoryReader {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&mut self, start: u64, length: usize) -> chunked_csv::Result<Vec<u8>> {
        let start = start as usize;
        self.data
            .get_ref()
            .get(start..start + length)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ReaderError::storage("memory", "range out of bounds"))
    }
}

struct CsvFile {
    bytes: Vec<u8>,
    rows: Vec<Vec<f32>>,
    longest_record: usize,
}

fn encode(values: &[Vec<i32>], crlf: bool, quoted: bool, trailing_newline: bool) -> CsvFile {
    let mut bytes = Vec::new();
    let mut rows = Vec::new();
    let mut longest_record = 0;

    for (index, row) in values.iter().enumerate() {
        let row: Vec<f32> = row.iter().map(|v| *v as f32 / 4.0).collect();
        let fields: Vec<String> = row
            .iter()
            .map(|v| if quoted { format!("\"{v}\"") } else { v.to_string() })
            .collect();

        let mut record = fields.join(",").into_bytes();
        if trailing_newline || index + 1 < values.len() {
            record.extend_from_slice(if crlf { b"\r\n" } else { b"\n" });
        }
        longest_record = longest_record.max(record.len());
        bytes.extend_from_slice(&record);
        rows.push(row);
    }

    CsvFile {
        bytes,
        rows,
        longest_record,
    }
}

fn open(file: &CsvFile, chunk_size: u64, probe_window: usize) -> chunked_csv::Result<ChunkReader> {
    let streams = [StreamSpec::new("x", [COLUMNS - 1]), StreamSpec::new("y", [1])];
    ChunkReader::from_reader(
        "memory.csv",
        Box::new(MemoryReader::new(file.bytes.clone())),
        &streams,
        &ChunkingConfig {
            chunk_size,
            probe_window,
        },
    )
}

fn csv_values() -> impl Strategy<Value = Vec<Vec<i32>>> {
    prop::collection::vec(prop::collection::vec(-4000i32..4000, COLUMNS), 0..60)
}

proptest! {
    #[test]
    fn chunks_partition_the_file(
        values in csv_values(),
        crlf in any::<bool>(),
        quoted in any::<bool>(),
        trailing_newline in any::<bool>(),
        extra in 0u64..200,
        probe_window in 1usize..40,
    ) {
        let file = encode(&values, crlf, quoted, trailing_newline);
        let chunk_size = (file.longest_record as u64 + extra).max(1);
        let mut reader = open(&file, chunk_size, probe_window).unwrap();

        let ranges = reader.plan().unwrap();
        prop_assert_eq!(ranges.len() as u64, (file.bytes.len() as u64).div_ceil(chunk_size));

        let mut expected_start = 0u64;
        let mut rebuilt = Vec::new();
        for range in &ranges {
            prop_assert_eq!(range.byte_start, expected_start);
            if range.byte_start > 0 {
                prop_assert_eq!(file.bytes[range.byte_start as usize - 1], b'\n');
            }
            let end = range.byte_end as usize;
            prop_assert!(end == file.bytes.len() || file.bytes[end - 1] == b'\n');

            rebuilt.extend_from_slice(&file.bytes[range.byte_start as usize..end]);
            expected_start = range.byte_end;
        }
        prop_assert_eq!(expected_start, file.bytes.len() as u64);
        prop_assert_eq!(rebuilt, file.bytes);
    }

    #[test]
    fn rows_round_trip_with_contiguous_ids(
        values in csv_values(),
        crlf in any::<bool>(),
        quoted in any::<bool>(),
        trailing_newline in any::<bool>(),
        extra in 0u64..200,
        probe_window in 1usize..40,
    ) {
        let file = encode(&values, crlf, quoted, trailing_newline);
        let chunk_size = (file.longest_record as u64 + extra).max(1);
        let mut reader = open(&file, chunk_size, probe_window).unwrap();

        let mut parsed = Vec::new();
        for chunk_id in 0..reader.chunk_count() {
            let chunk = reader.read_chunk(chunk_id).unwrap();
            for info in chunk.sequence_infos() {
                prop_assert_eq!(info.id, parsed.len() as u64);
                let sequence = chunk.sequence(info.index_in_chunk);
                prop_assert_eq!(sequence[0].len(), COLUMNS - 1);
                prop_assert_eq!(sequence[1].len(), 1);
                parsed.push(chunk.row(info.index_in_chunk).to_vec());
            }
        }
        prop_assert_eq!(parsed, file.rows);
    }

    #[test]
    fn out_of_order_reads_match_sequential_ids(
        values in prop::collection::vec(prop::collection::vec(-4000i32..4000, COLUMNS), 1..60),
        extra in 0u64..60,
        seed in any::<u64>(),
    ) {
        let file = encode(&values, false, false, true);
        let chunk_size = file.longest_record as u64 + extra;

        let mut sequential = open(&file, chunk_size, 8).unwrap();
        let expected: Vec<u64> = (0..sequential.chunk_count())
            .map(|id| sequential.read_chunk(id).unwrap().first_sequence_id())
            .collect();

        // Visit chunks in a seed-dependent order
        let count = expected.len() as u64;
        let mut order: Vec<u32> = (0..count as u32).collect();
        order.sort_by_key(|id| u64::from(*id).wrapping_mul(7919).wrapping_add(seed) % (count * 7 + 3));

        let mut shuffled = open(&file, chunk_size, 8).unwrap();
        for id in order {
            let chunk = shuffled.read_chunk(id).unwrap();
            prop_assert_eq!(chunk.first_sequence_id(), expected[id as usize]);
        }
    }

    #[test]
    fn oversized_records_are_reported(
        values in prop::collection::vec(prop::collection::vec(-4000i32..4000, COLUMNS), 1..30),
        long_row in 0usize..30,
        padding in 20usize..80,
    ) {
        let mut file = encode(&values, false, false, true);
        // Pad one field with leading zeros so its record outgrows the chunk size
        let long_row = long_row % values.len();
        let mut text = String::new();
        for (index, row) in file.rows.iter().enumerate() {
            let mut fields: Vec<String> = row.iter().map(f32::to_string).collect();
            if index == long_row {
                fields[0] = format!("{}{}", "0".repeat(padding), row[0].abs());
            }
            text.push_str(&fields.join(","));
            text.push('\n');
        }
        file.bytes = text.into_bytes();

        let record_lengths: Vec<usize> = file
            .bytes
            .split_inclusive(|&b| b == b'\n')
            .map(<[u8]>::len)
            .collect();
        let longest = record_lengths[long_row];
        let others = record_lengths
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != long_row)
            .map(|(_, len)| *len)
            .max()
            .unwrap_or(1);
        prop_assume!(longest > others);
        let chunk_size = (longest - 1) as u64;

        let mut failures = Vec::new();
        match open(&file, chunk_size, 16) {
            Err(e) => failures.push(e),
            Ok(mut reader) => {
                for chunk_id in 0..reader.chunk_count() {
                    if let Err(e) = reader.read_chunk(chunk_id) {
                        failures.push(e);
                    }
                }
            }
        }

        prop_assert!(!failures.is_empty());
        for failure in failures {
            prop_assert!(
                matches!(failure, ReaderError::RecordTooLarge { .. }),
                "unexpected error: {}",
                failure
            );
        }
    }
}
