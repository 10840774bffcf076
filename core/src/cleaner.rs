use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
    static ref ENGLISH_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","her","here","hers","herself","him","himself","his","how",
            "i","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
    static ref PORTUGUESE_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","à","ao","aos","aquela","aquelas","aquele","aqueles","aquilo","as","às","até",
            "com","como","da","das","de","dela","delas","dele","deles","depois","do","dos",
            "e","é","ela","elas","ele","eles","em","entre","era","eram","essa","essas","esse","esses","esta","está",
            "estas","este","estes","eu","foi","foram","há","isso","isto","já","lhe","lhes","mais","mas","me","mesmo",
            "meu","meus","minha","minhas","muito","na","nas","não","nem","no","nos","nós","nossa","nossas","nosso",
            "nossos","num","numa","o","os","ou","para","pela","pelas","pelo","pelos","por","qual","quando","que",
            "quem","se","seu","seus","só","sua","suas","também","te","tem","têm","teu","tu","um","uma","você","vocês",
        ];
        words.iter().copied().collect()
    };
}

/// Turns raw text into the tokens the index stores.
///
/// Documents and queries must go through the same cleaner, otherwise query
/// terms will not line up with indexed terms.
pub trait Cleaner {
    fn clean(&self, text: &str) -> Vec<String>;

    /// Occurrence count of each cleaned token.
    fn term_counts(&self, text: &str) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for token in self.clean(text) {
            *counts.entry(token).or_insert(0) += 1;
        }
        counts
    }
}

impl<C: Cleaner + ?Sized> Cleaner for &C {
    fn clean(&self, text: &str) -> Vec<String> {
        (**self).clean(text)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Portuguese,
    English,
}

impl Language {
    fn algorithm(self) -> Algorithm {
        match self {
            Language::Portuguese => Algorithm::Portuguese,
            Language::English => Algorithm::English,
        }
    }

    fn stopwords(self) -> &'static HashSet<&'static str> {
        match self {
            Language::Portuguese => &PORTUGUESE_STOPWORDS,
            Language::English => &ENGLISH_STOPWORDS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    pub language: Language,
    pub remove_stopwords: bool,
    pub remove_accents: bool,
    pub stem: bool,
}

/// Lowercasing tokenizer with optional stopword removal, accent folding and
/// Snowball stemming, applied in that order.
pub struct TextCleaner {
    config: CleanerConfig,
    stemmer: Option<Stemmer>,
}

impl TextCleaner {
    pub fn new(config: CleanerConfig) -> Self {
        let stemmer = config.stem.then(|| Stemmer::create(config.language.algorithm()));
        Self { config, stemmer }
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    fn clean_token(&self, token: &str) -> Option<String> {
        if self.config.remove_stopwords && self.config.language.stopwords().contains(token) {
            return None;
        }
        let token = if self.config.remove_accents {
            remove_accents(token)
        } else {
            token.to_string()
        };
        match &self.stemmer {
            Some(stemmer) => Some(stemmer.stem(&token).into_owned()),
            None => Some(token),
        }
    }
}

impl Default for TextCleaner {
    fn default() -> Self {
        Self::new(CleanerConfig::default())
    }
}

impl Cleaner for TextCleaner {
    fn clean(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        RE.find_iter(&normalized)
            .filter_map(|m| self.clean_token(m.as_str()))
            .filter(|t| !t.is_empty())
            .collect()
    }
}

fn remove_accents(token: &str) -> String {
    token.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}
