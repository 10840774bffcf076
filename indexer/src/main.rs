use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ir_core::evaluation::relevance_label;
use ir_core::{
    evaluate, load_relevance, Cleaner, CleanerConfig, DiskIndex, DiskIndexConfig, DocId,
    IndexBackend, Language, ModelChoice, PrecomputedStatistics, QueryEngine, RelevanceMap,
    TextCleaner, DEFAULT_BUFFER_CAPACITY, DEFAULT_CUTOFFS,
};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One input document: raw text to clean, or terms already cleaned and
/// counted upstream.
#[derive(Debug, Deserialize)]
struct InputDoc {
    id: DocId,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    terms: Option<HashMap<String, u32>>,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a term-level inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a disk index from JSON/JSONL documents
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Postings held in memory before spilling to disk
        #[arg(long, default_value_t = DEFAULT_BUFFER_CAPACITY)]
        buffer_capacity: usize,
        #[command(flatten)]
        cleaning: CleaningArgs,
    },
    /// Answer queries against a finalized index
    Query {
        /// Index directory
        #[arg(long, default_value = "./index")]
        index: String,
        /// Ranking model: and, or, vector
        #[arg(long, default_value = "vector")]
        model: String,
        /// Query text (repeatable). Without it, `<model> <query>` lines are read from stdin
        #[arg(long)]
        query: Vec<String>,
        /// Directory of relevance files, one comma-separated id list per query
        #[arg(long)]
        relevant: Option<String>,
        /// Number of document ids to print per query
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Print the term offset table of a finalized index
    Inspect {
        #[arg(long, default_value = "./index")]
        index: String,
        /// Only show this term, with its postings
        #[arg(long)]
        term: Option<String>,
    },
}

#[derive(Args, Clone)]
struct CleaningArgs {
    #[arg(long, value_enum, default_value_t = LanguageArg::Portuguese)]
    language: LanguageArg,
    /// Drop stopwords
    #[arg(long, default_value_t = false)]
    stopwords: bool,
    /// Fold accents (é -> e)
    #[arg(long, default_value_t = false)]
    accents: bool,
    /// Apply Snowball stemming
    #[arg(long, default_value_t = false)]
    stem: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LanguageArg {
    Portuguese,
    English,
}

impl From<CleaningArgs> for CleanerConfig {
    fn from(args: CleaningArgs) -> Self {
        CleanerConfig {
            language: match args.language {
                LanguageArg::Portuguese => Language::Portuguese,
                LanguageArg::English => Language::English,
            },
            remove_stopwords: args.stopwords,
            remove_accents: args.accents,
            stem: args.stem,
        }
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, buffer_capacity, cleaning } => {
            build_index(&input, &output, buffer_capacity, cleaning.into())
        }
        Commands::Query { index, model, query, relevant, top } => {
            run_queries(&index, &model, query, relevant.as_deref(), top)
        }
        Commands::Inspect { index, term } => inspect(&index, term.as_deref()),
    }
}

fn cleaner_path(index_dir: &Path) -> PathBuf {
    index_dir.join("cleaner.json")
}

/// Cleaner settings the index was built with; queries must use the same.
fn load_cleaner(index_dir: &Path) -> Result<TextCleaner> {
    let path = cleaner_path(index_dir);
    let config = if path.is_file() {
        let f = File::open(&path)?;
        serde_json::from_reader(BufReader::new(f)).with_context(|| format!("reading {}", path.display()))?
    } else {
        CleanerConfig::default()
    };
    Ok(TextCleaner::new(config))
}

fn input_files(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

fn build_index(input: &str, output: &str, buffer_capacity: usize, cleaner_config: CleanerConfig) -> Result<()> {
    let files = input_files(Path::new(input));
    let cleaner = TextCleaner::new(cleaner_config.clone());
    let config = DiskIndexConfig::new(output).with_buffer_capacity(buffer_capacity);
    let mut index = DiskIndex::new(config).with_context(|| format!("creating index in {output}"))?;

    let mut num_docs = 0usize;
    for file in &files {
        let docs = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(file)?
        } else {
            read_json(file)?
        };
        for doc in docs {
            ingest_doc(doc, &cleaner, &mut index)?;
            num_docs += 1;
        }
    }
    tracing::info!(files = files.len(), num_docs, num_terms = index.catalog().len(), "ingested documents");

    index.finalize()?;
    fs::write(cleaner_path(Path::new(output)), serde_json::to_string_pretty(&cleaner_config)?)?;
    tracing::info!(output, spills = index.spill_count(), postings = index.posting_count(), "index build complete");
    Ok(())
}

fn read_jsonl(file: &Path) -> Result<Vec<InputDoc>> {
    let reader = BufReader::new(File::open(file)?);
    let mut docs = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc: InputDoc = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), n + 1))?;
        docs.push(doc);
    }
    Ok(docs)
}

fn read_json(file: &Path) -> Result<Vec<InputDoc>> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    let docs = match json {
        serde_json::Value::Array(arr) => arr
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<InputDoc>, _>>()?,
        serde_json::Value::Object(_) => vec![serde_json::from_value(json)?],
        _ => Vec::new(),
    };
    Ok(docs)
}

fn ingest_doc(doc: InputDoc, cleaner: &dyn Cleaner, index: &mut dyn IndexBackend) -> Result<()> {
    let counts = match (doc.terms, doc.text) {
        (Some(terms), _) => terms,
        (None, Some(text)) => cleaner.term_counts(&text),
        (None, None) => {
            tracing::warn!(doc_id = doc.id, "document has neither text nor terms");
            return Ok(());
        }
    };
    // sorted so term ids do not depend on hash order
    let mut counts: Vec<(String, u32)> = counts.into_iter().collect();
    counts.sort_unstable();
    for (term, freq) in counts {
        index.index(&term, doc.id, freq)?;
    }
    Ok(())
}

struct QuerySession<'a> {
    index: &'a DiskIndex,
    engine: QueryEngine<'a, TextCleaner>,
    stats: Option<PrecomputedStatistics>,
    relevance: RelevanceMap,
    top: usize,
}

impl<'a> QuerySession<'a> {
    fn answer(&mut self, choice: ModelChoice, query: &str) -> ir_core::Result<()> {
        if choice == ModelChoice::Vector && self.stats.is_none() {
            self.stats = Some(PrecomputedStatistics::build(self.index)?);
        }
        let model = choice.build(self.stats.as_ref())?;
        let ordered = self.engine.answer(query, model.as_ref())?;

        println!("[{choice}] {query:?}: {} documents", ordered.len());
        let shown: Vec<String> = ordered.iter().take(self.top).map(DocId::to_string).collect();
        println!("  top {}: {}", shown.len(), shown.join(", "));

        match self.relevance.get(&relevance_label(query)) {
            Some(relevant) => {
                for m in evaluate(query, &ordered, relevant, &DEFAULT_CUTOFFS).metrics {
                    println!("  P@{:<2} {:.4}  R@{:<2} {:.4}", m.n, m.precision, m.n, m.recall);
                }
            }
            None if !self.relevance.is_empty() => println!("  no relevance judgements for this query"),
            None => {}
        }
        Ok(())
    }
}

fn run_queries(index_dir: &str, model: &str, queries: Vec<String>, relevant: Option<&str>, top: usize) -> Result<()> {
    let index = DiskIndex::open(index_dir).with_context(|| format!("opening index {index_dir}"))?;
    let cleaner = load_cleaner(Path::new(index_dir))?;
    let relevance = match relevant {
        Some(dir) => load_relevance(dir)?,
        None => RelevanceMap::new(),
    };
    let mut session = QuerySession {
        index: &index,
        engine: QueryEngine::new(&index, cleaner),
        stats: None,
        relevance,
        top,
    };

    if !queries.is_empty() {
        let choice: ModelChoice = model.parse()?;
        for query in &queries {
            session.answer(choice, query)?;
        }
        return Ok(());
    }

    // interactive: each line is `<model> <query>`; bad lines are reported and skipped
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() { continue; }
        if matches!(line, "quit" | "exit") { break; }
        let (model, query) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let result = model
            .parse::<ModelChoice>()
            .and_then(|choice| session.answer(choice, query.trim()));
        if let Err(e) = result {
            eprintln!("error: {e}");
        }
    }
    Ok(())
}

fn inspect(index_dir: &str, term: Option<&str>) -> Result<()> {
    let index = DiskIndex::open(index_dir).with_context(|| format!("opening index {index_dir}"))?;
    let stats = PrecomputedStatistics::build(&index)?;
    println!(
        "{} terms, {} documents, {} postings",
        index.catalog().len(),
        stats.document_count(),
        index.posting_count()
    );
    match term {
        Some(term) => {
            let Some(location) = index.location(term) else {
                println!("{term}: not indexed");
                return Ok(());
            };
            println!("{term}\tid={}\toffset={}\tdocs={}", location.term_id, location.start_offset, location.doc_count);
            for p in index.occurrences(term)? {
                println!("  doc {}\tfreq {}", p.doc_id, p.term_freq);
            }
        }
        None => {
            for location in index.locations() {
                let name = index.catalog().term(location.term_id).unwrap_or("?");
                println!("{name}\tid={}\toffset={}\tdocs={}", location.term_id, location.start_offset, location.doc_count);
            }
        }
    }
    Ok(())
}
