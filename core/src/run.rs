//! Fixed-size record codec for sorted postings runs.
//!
//! A run is a flat sequence of [`PostingRecord`]s, each encoded with bincode's
//! fixed-width little-endian layout: `doc_id: u64`, `term_id: u32`,
//! `term_freq: u32`. The constant record width is what lets the finalized
//! postings file be addressed by byte offset.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::index::PostingRecord;

pub const RECORD_SIZE: u64 = 16;

/// Result of pulling one record from a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Record(PostingRecord),
    /// Clean end of the run, exactly on a record boundary.
    EndOfStream,
}

pub struct RunWriter {
    out: BufWriter<File>,
    written: u64,
}

impl RunWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self { out: BufWriter::new(file), written: 0 })
    }

    pub fn write(&mut self, record: &PostingRecord) -> Result<()> {
        bincode::serialize_into(&mut self.out, record)?;
        self.written += 1;
        Ok(())
    }

    /// Flush buffered records and return how many were written. The file
    /// is not synced.
    pub fn finish(mut self) -> Result<u64> {
        self.out.flush()?;
        Ok(self.written)
    }
}

pub struct RunReader<R> {
    input: R,
    offset: u64,
    buf: [u8; RECORD_SIZE as usize],
}

impl RunReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_at(path, 0)
    }

    /// Open a run positioned at byte `offset`.
    pub fn open_at<P: AsRef<Path>>(path: P, offset: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }
        Ok(Self::with_offset(BufReader::new(file), offset))
    }
}

impl<R: Read> RunReader<R> {
    pub fn new(input: R) -> Self {
        Self::with_offset(input, 0)
    }

    fn with_offset(input: R, offset: u64) -> Self {
        Self { input, offset, buf: [0; RECORD_SIZE as usize] }
    }

    /// Byte offset of the next record.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn next_record(&mut self) -> Result<ReadOutcome> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.input.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(ReadOutcome::EndOfStream);
        }
        if filled < self.buf.len() {
            return Err(Error::corrupt(
                self.offset,
                format!("truncated record ({filled} of {RECORD_SIZE} bytes)"),
            ));
        }
        let record: PostingRecord = bincode::deserialize(&self.buf)
            .map_err(|e| Error::corrupt(self.offset, e.to_string()))?;
        if record.term_freq == 0 {
            return Err(Error::corrupt(self.offset, "zero term frequency"));
        }
        self.offset += RECORD_SIZE;
        Ok(ReadOutcome::Record(record))
    }

    /// Read the next record, treating end of stream as corruption.
    pub fn expect_record(&mut self) -> Result<PostingRecord> {
        match self.next_record()? {
            ReadOutcome::Record(record) => Ok(record),
            ReadOutcome::EndOfStream => Err(Error::corrupt(self.offset, "unexpected end of postings")),
        }
    }
}

impl<R: Read> Iterator for RunReader<R> {
    type Item = Result<PostingRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(ReadOutcome::Record(record)) => Some(Ok(record)),
            Ok(ReadOutcome::EndOfStream) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(records: &[PostingRecord]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for r in records {
            bincode::serialize_into(&mut bytes, r).unwrap();
        }
        bytes
    }

    #[test]
    fn record_size_matches_encoding() {
        let size = bincode::serialized_size(&PostingRecord::new(u64::MAX, u32::MAX, 1)).unwrap();
        assert_eq!(size, RECORD_SIZE);
    }

    #[test]
    fn clean_end_is_end_of_stream() {
        let bytes = encode(&[PostingRecord::new(3, 0, 2)]);
        let mut reader = RunReader::new(Cursor::new(bytes));
        assert_eq!(reader.next_record().unwrap(), ReadOutcome::Record(PostingRecord::new(3, 0, 2)));
        assert_eq!(reader.next_record().unwrap(), ReadOutcome::EndOfStream);
        assert_eq!(reader.offset(), RECORD_SIZE);
    }

    #[test]
    fn truncated_record_is_corrupt() {
        let mut bytes = encode(&[PostingRecord::new(3, 0, 2), PostingRecord::new(4, 0, 1)]);
        bytes.truncate(bytes.len() - 5);
        let mut reader = RunReader::new(Cursor::new(bytes));
        assert!(matches!(reader.next_record(), Ok(ReadOutcome::Record(_))));
        let err = reader.next_record().unwrap_err();
        assert!(matches!(err, Error::CorruptRecord { offset: 16, .. }));
    }

    #[test]
    fn zero_frequency_is_corrupt() {
        let bytes = encode(&[PostingRecord::new(3, 0, 0)]);
        let mut reader = RunReader::new(Cursor::new(bytes));
        assert!(reader.next_record().unwrap_err().is_corruption());
    }

    #[test]
    fn writer_and_reader_agree_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.tmp");
        let records = [PostingRecord::new(1, 0, 1), PostingRecord::new(2, 0, 4), PostingRecord::new(1, 1, 2)];
        let mut w = RunWriter::create(&path).unwrap();
        for r in &records {
            w.write(r).unwrap();
        }
        assert_eq!(w.finish().unwrap(), 3);

        let mut reader = RunReader::open_at(&path, RECORD_SIZE).unwrap();
        let rec = reader.expect_record().unwrap();
        assert_eq!((rec.doc_id, rec.term_freq), (2, 4));
        let rest: Vec<_> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(rest, vec![PostingRecord::new(1, 1, 2)]);
    }
}
