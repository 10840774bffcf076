use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::index::DocId;

pub const DEFAULT_CUTOFFS: [usize; 4] = [5, 10, 20, 50];

/// Ground truth: query label -> relevant document ids.
pub type RelevanceMap = HashMap<String, HashSet<DocId>>;

#[derive(Debug, Clone, PartialEq)]
pub struct CutoffMetrics {
    pub n: usize,
    pub relevant_retrieved: usize,
    pub precision: f64,
    pub recall: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub query: String,
    pub metrics: Vec<CutoffMetrics>,
}

impl Evaluation {
    pub fn at(&self, n: usize) -> Option<&CutoffMetrics> {
        self.metrics.iter().find(|m| m.n == n)
    }
}

pub fn count_topn_relevant(n: usize, ordered: &[DocId], relevant: &HashSet<DocId>) -> usize {
    ordered.iter().take(n).filter(|d| relevant.contains(d)).count()
}

/// Precision and recall of `ordered` at each cutoff.
///
/// Precision divides by the cutoff even when fewer documents were returned;
/// recall is 0 when nothing is relevant.
pub fn evaluate(query: &str, ordered: &[DocId], relevant: &HashSet<DocId>, cutoffs: &[usize]) -> Evaluation {
    let metrics = cutoffs
        .iter()
        .map(|&n| {
            let hits = count_topn_relevant(n, ordered, relevant);
            CutoffMetrics {
                n,
                relevant_retrieved: hits,
                precision: if n == 0 { 0.0 } else { hits as f64 / n as f64 },
                recall: if relevant.is_empty() { 0.0 } else { hits as f64 / relevant.len() as f64 },
            }
        })
        .collect();
    Evaluation { query: query.to_string(), metrics }
}

/// Normalize a query or file stem into a relevance label:
/// lowercase, underscores as spaces, single spaces.
pub fn relevance_label(s: &str) -> String {
    s.to_lowercase().replace('_', " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Load one relevance file per query from `dir`. The file stem names the
/// query (`belo_horizonte.dat` is "belo horizonte"); the contents are a
/// comma-separated list of document ids.
pub fn load_relevance<P: AsRef<Path>>(dir: P) -> Result<RelevanceMap> {
    let mut map = RelevanceMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let contents = fs::read_to_string(&path)?;
        let mut ids = HashSet::new();
        for raw in contents.split(|c: char| c == ',' || c.is_whitespace()) {
            if raw.is_empty() {
                continue;
            }
            let id = raw.parse::<DocId>().map_err(|e| Error::InvalidRelevance {
                path: path.display().to_string(),
                reason: format!("{raw:?}: {e}"),
            })?;
            ids.insert(id);
        }
        map.insert(relevance_label(stem), ids);
    }
    Ok(map)
}
