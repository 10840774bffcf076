use crate::disk::TermLocation;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_terms: u32,
    pub num_postings: u64,
    pub record_size: u64,
    pub created_at: String,
}

/// File layout of an index directory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn postings(&self) -> PathBuf { self.root.join("postings.bin") }
    pub fn catalog(&self) -> PathBuf { self.root.join("catalog.bin") }
    pub fn offsets(&self) -> PathBuf { self.root.join("offsets.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn run(&self, n: u32) -> PathBuf { self.root.join(format!("run_{n}.tmp")) }

    /// True when the directory holds a finalized index.
    pub fn is_finalized(&self) -> bool {
        self.meta().is_file() && self.postings().is_file()
    }
}

pub fn save_catalog(paths: &IndexPaths, terms: &[String]) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = BufWriter::new(File::create(paths.catalog())?);
    bincode::serialize_into(&mut f, terms)?;
    f.flush()?;
    Ok(())
}

pub fn load_catalog(paths: &IndexPaths) -> Result<Vec<String>> {
    let f = BufReader::new(File::open(paths.catalog())?);
    let terms = bincode::deserialize_from(f)?;
    Ok(terms)
}

pub fn save_offsets(paths: &IndexPaths, locations: &[TermLocation]) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = BufWriter::new(File::create(paths.offsets())?);
    bincode::serialize_into(&mut f, locations)?;
    f.flush()?;
    Ok(())
}

pub fn load_offsets(paths: &IndexPaths) -> Result<Vec<TermLocation>> {
    let f = BufReader::new(File::open(paths.offsets())?);
    let locations = bincode::deserialize_from(f)?;
    Ok(locations)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
