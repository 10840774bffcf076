//! Disk-backed postings built with a bounded buffer.
//!
//! While building, postings collect in a fixed-capacity buffer. A full
//! buffer is sorted and merged with the single sorted run on disk, so memory
//! stays proportional to the buffer no matter how large the collection is.
//! `finalize` scans the final run once to derive each term's offset and
//! document count; lookups then seek straight to a term's postings.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::index::{DocId, IndexBackend, PostingRecord, TermCatalog, TermId};
use crate::persist::{
    load_catalog, load_meta, load_offsets, now_rfc3339, save_catalog, save_meta, save_offsets,
    IndexPaths, MetaFile,
};
use crate::run::{ReadOutcome, RunReader, RunWriter, RECORD_SIZE};

pub const DEFAULT_BUFFER_CAPACITY: usize = 1_000_000;
// the buffer grows to `buffer_capacity` on demand and keeps its allocation across spills
const INITIAL_BUFFER_ALLOCATION: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskIndexConfig {
    /// Directory holding transient runs and the finalized index.
    pub dir: PathBuf,
    /// Postings buffered in memory before a spill.
    pub buffer_capacity: usize,
}

impl Default for DiskIndexConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("./index"), buffer_capacity: DEFAULT_BUFFER_CAPACITY }
    }
}

impl DiskIndexConfig {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), ..Self::default() }
    }

    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }
}

/// Where a term's postings live in the finalized postings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermLocation {
    pub term_id: TermId,
    pub start_offset: u64,
    pub doc_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Building,
    Finalizing,
    Queryable,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Building => "building",
            Phase::Finalizing => "finalizing",
            Phase::Queryable => "queryable",
        }
    }
}

#[derive(Debug)]
pub struct DiskIndex {
    paths: IndexPaths,
    capacity: usize,
    phase: Phase,
    catalog: TermCatalog,
    buffer: Vec<PostingRecord>,
    // (term_id, doc_id) -> position in `buffer`
    slots: HashMap<(TermId, DocId), usize>,
    run: Option<PathBuf>,
    run_counter: u32,
    spills: u32,
    locations: Vec<TermLocation>,
    num_postings: u64,
}

impl DiskIndex {
    pub fn new(config: DiskIndexConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        let capacity = config.buffer_capacity.max(1);
        Ok(Self {
            paths: IndexPaths::new(&config.dir),
            capacity,
            phase: Phase::Building,
            catalog: TermCatalog::new(),
            buffer: Vec::with_capacity(capacity.min(INITIAL_BUFFER_ALLOCATION)),
            slots: HashMap::new(),
            run: None,
            run_counter: 0,
            spills: 0,
            locations: Vec::new(),
            num_postings: 0,
        })
    }

    /// Reopen a finalized index directory for querying.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let paths = IndexPaths::new(dir);
        let meta = load_meta(&paths)?;
        if meta.record_size != RECORD_SIZE {
            return Err(Error::corrupt(0, format!("record size {} in meta.json, expected {RECORD_SIZE}", meta.record_size)));
        }
        let catalog = TermCatalog::from_terms(load_catalog(&paths)?);
        if meta.num_terms as usize != catalog.len() {
            return Err(Error::corrupt(0, format!("{} terms in meta.json, catalog holds {}", meta.num_terms, catalog.len())));
        }
        let locations = load_offsets(&paths)?;
        if locations.len() != catalog.len() {
            return Err(Error::corrupt(0, format!("{} offsets for {} terms", locations.len(), catalog.len())));
        }
        let expected = meta
            .num_postings
            .checked_mul(RECORD_SIZE)
            .ok_or_else(|| Error::corrupt(0, format!("{} postings in meta.json", meta.num_postings)))?;
        let file_len = fs::metadata(paths.postings())?.len();
        if file_len != expected {
            return Err(Error::corrupt(file_len.min(expected), format!("postings file is {file_len} bytes, expected {expected}")));
        }
        check_locations(&locations, expected)?;
        tracing::info!(dir = %paths.root.display(), terms = catalog.len(), postings = meta.num_postings, "opened disk index");
        Ok(Self {
            paths,
            capacity: 1,
            phase: Phase::Queryable,
            catalog,
            buffer: Vec::new(),
            slots: HashMap::new(),
            run: None,
            run_counter: 0,
            spills: 0,
            locations,
            num_postings: meta.num_postings,
        })
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    pub fn spill_count(&self) -> u32 {
        self.spills
    }

    pub fn posting_count(&self) -> u64 {
        self.num_postings
    }

    /// Offset table in term id order; empty until finalized.
    pub fn locations(&self) -> &[TermLocation] {
        &self.locations
    }

    pub fn location(&self, term: &str) -> Option<&TermLocation> {
        let id = self.catalog.lookup_id(term)?;
        self.locations.get(id as usize)
    }

    fn require(&self, phase: Phase, operation: &'static str) -> Result<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(Error::StateViolation { operation, state: self.phase.name() })
        }
    }

    fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        // keys are unique here, `index` folds duplicates into one slot
        self.buffer.sort_unstable();

        let target = self.paths.run(self.run_counter);
        let written = match write_run(&target, self.run.as_deref(), &self.buffer) {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&target);
                return Err(e);
            }
        };
        if let Some(previous) = &self.run {
            fs::remove_file(previous)?;
        }
        tracing::debug!(
            spill = self.spills,
            buffered = self.buffer.len(),
            run_records = written,
            run = %target.display(),
            "spilled postings buffer"
        );

        self.run = Some(target);
        self.run_counter += 1;
        self.spills += 1;
        self.buffer.clear();
        self.slots.clear();
        Ok(())
    }
}

/// Write the sorted `buffer` to `target`, merged with the `previous` run if
/// there is one.
fn write_run(target: &Path, previous: Option<&Path>, buffer: &[PostingRecord]) -> Result<u64> {
    let mut writer = RunWriter::create(target)?;
    match previous {
        None => {
            for record in buffer {
                writer.write(record)?;
            }
        }
        Some(previous) => {
            let mut reader = RunReader::open(previous)?;
            merge_runs(&mut reader, buffer, &mut writer)?;
        }
    }
    writer.finish()
}

/// Merge a sorted run with a sorted buffer into `out`.
///
/// A key present in both sources is written once with the frequencies
/// summed.
fn merge_runs<R: Read>(run: &mut RunReader<R>, buffer: &[PostingRecord], out: &mut RunWriter) -> Result<()> {
    let mut head = run.next_record()?;
    let mut i = 0;
    loop {
        match (head, buffer.get(i)) {
            (ReadOutcome::EndOfStream, None) => return Ok(()),
            (ReadOutcome::Record(r), None) => {
                out.write(&r)?;
                head = run.next_record()?;
            }
            (ReadOutcome::EndOfStream, Some(b)) => {
                out.write(b)?;
                i += 1;
            }
            (ReadOutcome::Record(r), Some(b)) => match r.cmp(b) {
                Ordering::Less => {
                    out.write(&r)?;
                    head = run.next_record()?;
                }
                Ordering::Greater => {
                    out.write(b)?;
                    i += 1;
                }
                Ordering::Equal => {
                    let merged = PostingRecord { term_freq: r.term_freq.saturating_add(b.term_freq), ..r };
                    out.write(&merged)?;
                    head = run.next_record()?;
                    i += 1;
                }
            },
        }
    }
}

/// Scan a finalized postings file and lay out one location per term id.
///
/// The file must be strictly ordered by `(term_id, doc_id)` and reference
/// only ids below `num_terms`.
pub(crate) fn build_locations(path: &Path, num_terms: usize) -> Result<(Vec<TermLocation>, u64)> {
    let mut reader = RunReader::open(path)?;
    let mut counts = vec![0u64; num_terms];
    let mut previous: Option<PostingRecord> = None;
    let mut total = 0u64;
    loop {
        let offset = reader.offset();
        let record = match reader.next_record()? {
            ReadOutcome::Record(record) => record,
            ReadOutcome::EndOfStream => break,
        };
        let Some(count) = counts.get_mut(record.term_id as usize) else {
            return Err(Error::corrupt(offset, format!("unknown term id {}", record.term_id)));
        };
        if let Some(prev) = previous {
            if prev.key() >= record.key() {
                return Err(Error::corrupt(
                    offset,
                    format!("record {:?} does not follow {:?}", record.key(), prev.key()),
                ));
            }
        }
        *count += 1;
        total += 1;
        previous = Some(record);
    }

    let mut start_offset = 0;
    let locations = counts
        .into_iter()
        .enumerate()
        .map(|(id, doc_count)| {
            let location = TermLocation { term_id: id as TermId, start_offset, doc_count };
            start_offset += doc_count * RECORD_SIZE;
            location
        })
        .collect();
    Ok((locations, total))
}

/// Check a loaded offset table against the layout `build_locations` produces
/// for a postings file of `file_len` bytes.
fn check_locations(locations: &[TermLocation], file_len: u64) -> Result<()> {
    let mut next_offset = 0u64;
    for (id, location) in locations.iter().enumerate() {
        if location.term_id as usize != id {
            return Err(Error::corrupt(
                location.start_offset,
                format!("offset entry {id} names term id {}", location.term_id),
            ));
        }
        if location.start_offset != next_offset {
            return Err(Error::corrupt(
                location.start_offset,
                format!("term id {id} starts at {}, expected {next_offset}", location.start_offset),
            ));
        }
        next_offset = location
            .doc_count
            .checked_mul(RECORD_SIZE)
            .and_then(|len| next_offset.checked_add(len))
            .filter(|&end| end <= file_len)
            .ok_or_else(|| {
                Error::corrupt(
                    location.start_offset,
                    format!("term id {id} claims {} postings past the end of the file", location.doc_count),
                )
            })?;
    }
    if next_offset != file_len {
        return Err(Error::corrupt(next_offset, format!("offset table covers {next_offset} of {file_len} bytes")));
    }
    Ok(())
}

impl IndexBackend for DiskIndex {
    fn index(&mut self, term: &str, doc_id: DocId, term_freq: u32) -> Result<()> {
        self.require(Phase::Building, "index")?;
        if term_freq == 0 {
            return Ok(());
        }
        let term_id = self.catalog.get_or_create_id(term);
        match self.slots.entry((term_id, doc_id)) {
            Entry::Occupied(slot) => {
                let record = &mut self.buffer[*slot.get()];
                record.term_freq = record.term_freq.saturating_add(term_freq);
            }
            Entry::Vacant(slot) => {
                slot.insert(self.buffer.len());
                self.buffer.push(PostingRecord::new(doc_id, term_id, term_freq));
            }
        }
        if self.buffer.len() >= self.capacity {
            self.spill()?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.require(Phase::Building, "finalize")?;
        self.phase = Phase::Finalizing;
        self.spill()?;

        let postings = self.paths.postings();
        match self.run.take() {
            Some(run) => fs::rename(run, &postings)?,
            None => {
                RunWriter::create(&postings)?.finish()?;
            }
        }
        // runs are transient; only the finalized file is made durable
        fs::File::open(&postings)?.sync_all()?;
        let (locations, total) = build_locations(&postings, self.catalog.len())?;

        self.num_postings = total;
        save_catalog(&self.paths, self.catalog.terms())?;
        save_offsets(&self.paths, &locations)?;
        save_meta(
            &self.paths,
            &MetaFile {
                num_terms: self.catalog.len() as u32,
                num_postings: total,
                record_size: RECORD_SIZE,
                created_at: now_rfc3339(),
            },
        )?;
        self.locations = locations;
        self.buffer = Vec::new();
        self.slots = HashMap::new();
        self.phase = Phase::Queryable;

        tracing::info!(
            terms = self.catalog.len(),
            postings = total,
            spills = self.spills,
            "disk index finalized"
        );
        Ok(())
    }

    fn is_finalized(&self) -> bool {
        self.phase == Phase::Queryable
    }

    fn catalog(&self) -> &TermCatalog {
        &self.catalog
    }

    fn occurrences(&self, term: &str) -> Result<Vec<PostingRecord>> {
        self.require(Phase::Queryable, "read postings")?;
        let Some(location) = self.location(term).copied() else {
            return Ok(Vec::new());
        };
        if location.doc_count == 0 {
            return Ok(Vec::new());
        }
        let mut reader = RunReader::open_at(self.paths.postings(), location.start_offset)?;
        let mut postings = Vec::with_capacity(location.doc_count.min(self.num_postings) as usize);
        for _ in 0..location.doc_count {
            let offset = reader.offset();
            let record = reader.expect_record()?;
            if record.term_id != location.term_id {
                return Err(Error::corrupt(
                    offset,
                    format!("expected term id {}, found {}", location.term_id, record.term_id),
                ));
            }
            postings.push(record);
        }
        Ok(postings)
    }

    fn document_count_with(&self, term: &str) -> Result<usize> {
        self.require(Phase::Queryable, "count documents")?;
        Ok(self.location(term).map_or(0, |l| l.doc_count as usize))
    }

    fn for_each_posting(&self, visit: &mut dyn FnMut(&PostingRecord)) -> Result<()> {
        self.require(Phase::Queryable, "scan postings")?;
        for record in RunReader::open(self.paths.postings())? {
            visit(&record?);
        }
        Ok(())
    }
}

impl Drop for DiskIndex {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            let _ = fs::remove_file(run);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build(dir: &Path, capacity: usize, postings: &[(&str, DocId, u32)]) -> DiskIndex {
        let mut idx = DiskIndex::new(DiskIndexConfig::new(dir).with_buffer_capacity(capacity)).unwrap();
        for &(term, doc, freq) in postings {
            idx.index(term, doc, freq).unwrap();
        }
        idx.finalize().unwrap();
        idx
    }

    const IRLANDA: &[(&str, DocId, u32)] = &[
        ("irlanda", 37632, 1),
        ("irlanda", 39300, 3),
        ("espero", 39300, 1),
        ("que", 11953, 1),
        ("irlanda", 11953, 1),
        ("estejam", 11953, 1),
        ("se", 11953, 1),
        ("irlanda", 37632, 4),
        ("que", 44259, 1),
        ("irlanda", 44259, 1),
        ("estejam", 44259, 1),
        ("se", 44259, 1),
        ("que", 51714, 1),
        ("irlanda", 51714, 1),
        ("estejam", 51714, 1),
        ("se", 51714, 1),
    ];

    #[test]
    fn offsets_are_contiguous_per_term() {
        let dir = tempfile::tempdir().unwrap();
        let idx = build(dir.path(), 3, IRLANDA);
        let locs = idx.locations();
        assert_eq!(locs[0].start_offset, 0);
        for pair in locs.windows(2) {
            assert_eq!(pair[1].start_offset, pair[0].start_offset + pair[0].doc_count * RECORD_SIZE);
        }
        assert_eq!(idx.location("irlanda").unwrap().doc_count, 5);
        assert_eq!(idx.document_count_with("se").unwrap(), 3);
    }

    #[test]
    fn duplicate_across_spill_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        // capacity 1 spills after every posting
        let idx = build(dir.path(), 1, &[("a", 1, 1), ("b", 2, 1), ("a", 1, 3)]);
        let occ = idx.occurrences("a").unwrap();
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].term_freq, 4);
        assert_eq!(idx.spill_count(), 3);
    }

    #[test]
    fn only_final_postings_remain_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let _idx = build(dir.path(), 2, IRLANDA);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn reads_before_finalize_fail() {
        let dir = tempfile::tempdir().unwrap();
        let mut idx = DiskIndex::new(DiskIndexConfig::new(dir.path())).unwrap();
        idx.index("a", 1, 1).unwrap();
        let err = idx.occurrences("a").unwrap_err();
        assert!(matches!(err, Error::StateViolation { state: "building", .. }));
    }

    #[test]
    fn index_after_finalize_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut idx = build(dir.path(), 10, &[("a", 1, 1)]);
        let err = idx.index("a", 2, 1).unwrap_err();
        assert!(matches!(err, Error::StateViolation { operation: "index", state: "queryable" }));
        assert!(matches!(idx.finalize(), Err(Error::StateViolation { .. })));
    }

    #[test]
    fn empty_index_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let idx = build(dir.path(), 10, &[]);
        assert!(idx.locations().is_empty());
        assert!(idx.occurrences("x").unwrap().is_empty());
        assert_eq!(idx.posting_count(), 0);
        assert!(DiskIndex::open(dir.path()).unwrap().locations().is_empty());
    }

    #[test]
    fn out_of_order_run_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postings.bin");
        let mut w = RunWriter::create(&path).unwrap();
        w.write(&PostingRecord::new(5, 1, 1)).unwrap();
        w.write(&PostingRecord::new(2, 0, 1)).unwrap();
        w.finish().unwrap();
        let err = build_locations(&path, 2).unwrap_err();
        assert!(matches!(err, Error::CorruptRecord { offset: 16, .. }));
    }

    #[test]
    fn unknown_term_id_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postings.bin");
        let mut w = RunWriter::create(&path).unwrap();
        w.write(&PostingRecord::new(5, 7, 1)).unwrap();
        w.finish().unwrap();
        assert!(build_locations(&path, 2).unwrap_err().is_corruption());
    }

    #[test]
    fn truncated_postings_fail_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let idx = build(dir.path(), 100, IRLANDA);
        let path = idx.paths().postings();
        let len = fs::metadata(&path).unwrap().len();
        let bytes = fs::read(&path).unwrap();
        // cut the last term's final record in half
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(&bytes[..(len - RECORD_SIZE / 2) as usize]).unwrap();
        drop(f);
        let last = idx.catalog().terms().last().unwrap().clone();
        assert!(idx.occurrences(&last).unwrap_err().is_corruption());
        assert!(DiskIndex::open(dir.path()).unwrap_err().is_corruption());
    }

    #[test]
    fn reopened_index_answers_the_same() {
        let dir = tempfile::tempdir().unwrap();
        let idx = build(dir.path(), 4, IRLANDA);
        let reopened = DiskIndex::open(dir.path()).unwrap();
        for term in idx.catalog().terms() {
            assert_eq!(idx.occurrences(term).unwrap(), reopened.occurrences(term).unwrap());
        }
        assert_eq!(reopened.posting_count(), IRLANDA.len() as u64 - 1);
        assert_eq!(reopened.locations(), idx.locations());
    }

    #[test]
    fn building_holds_only_the_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut idx = DiskIndex::new(DiskIndexConfig::new(dir.path()).with_buffer_capacity(4)).unwrap();
        for doc in 0..5000 {
            idx.index(if doc % 2 == 0 { "par" } else { "impar" }, doc, 1).unwrap();
        }
        assert_eq!(idx.spill_count(), 1250);
        assert!(idx.buffer.is_empty() && idx.slots.is_empty());
        assert!(idx.buffer.capacity() <= 4);
        assert!(idx.slots.capacity() < 64);
        idx.finalize().unwrap();
        assert_eq!(idx.posting_count(), 5000);
    }

    #[test]
    fn failed_spill_leaves_no_partial_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut idx = DiskIndex::new(DiskIndexConfig::new(dir.path()).with_buffer_capacity(1)).unwrap();
        idx.index("a", 1, 1).unwrap();
        let first = idx.paths().run(0);
        let bytes = fs::read(&first).unwrap();
        fs::write(&first, &bytes[..(RECORD_SIZE / 2) as usize]).unwrap();

        assert!(idx.index("b", 2, 1).unwrap_err().is_corruption());
        assert!(!idx.paths().run(1).exists());
        assert_eq!(idx.spill_count(), 1);
    }

    fn rewrite_offsets(dir: &Path, edit: impl FnOnce(&mut Vec<TermLocation>)) {
        let paths = IndexPaths::new(dir);
        let mut locations = load_offsets(&paths).unwrap();
        edit(&mut locations);
        save_offsets(&paths, &locations).unwrap();
    }

    #[test]
    fn oversized_doc_count_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        drop(build(dir.path(), 10, &[("a", 1, 1), ("b", 1, 2)]));
        rewrite_offsets(dir.path(), |locs| locs[0].doc_count = u64::MAX / 2);
        assert!(matches!(DiskIndex::open(dir.path()), Err(Error::CorruptRecord { .. })));
    }

    #[test]
    fn inconsistent_offset_table_fails_open() {
        let edits: [fn(&mut Vec<TermLocation>); 4] = [
            |locs| locs[1].term_id = 0,
            |locs| locs[0].start_offset = RECORD_SIZE,
            |locs| locs[1].start_offset += RECORD_SIZE,
            |locs| locs[1].doc_count = 0,
        ];
        for edit in edits {
            let dir = tempfile::tempdir().unwrap();
            drop(build(dir.path(), 10, IRLANDA));
            assert!(DiskIndex::open(dir.path()).is_ok());
            rewrite_offsets(dir.path(), edit);
            assert!(DiskIndex::open(dir.path()).unwrap_err().is_corruption());
        }
    }

    #[test]
    fn finalized_index_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DiskIndex>();
    }
}
