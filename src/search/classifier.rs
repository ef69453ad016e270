//! Query complexity classification.
//!
//! Maps a [`Query`] to a [`ComplexityProfile`] from four deterministic
//! signals:
//!
//! - **lexical**: share of technical tokens (versioned names, dotted or
//!   symbol-joined names, known technology terms)
//! - **syntactic**: clause count and query length
//! - **semantic**: number of distinct concepts and the relations joining them
//! - **multi-hop**: a comparative or causal connective linking two or more
//!   concepts
//!
//! The first three are combined with [`ClassifierConfig`] weights and
//! thresholded into a [`Tier`]. The multi-hop signal overrides the weighted
//! tier. Classification never fails: a query without concepts falls back to
//! [`Tier::Simple`] with the query itself as the only variant.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::query::is_han;
use crate::core::text::is_stopword;
use crate::core::{Query, tokenize};

/// Token pattern: a letter or digit followed by letters, digits and the
/// joiners that appear in technical names (`c++`, `c#`, `node.js`, `gpt-4`),
/// or a single clause punctuation mark.
const TOKEN_PATTERN: &str = r"[\p{L}\p{N}][\p{L}\p{N}+#.\-]*|[,;:?!，；：？！]";

/// Clause punctuation emitted as standalone tokens.
const PUNCTUATION: &[char] = &[',', ';', ':', '?', '!', '，', '；', '：', '？', '！'];

static TOKEN_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(TOKEN_PATTERN).ok());

/// Well-known technology terms counted by the lexical signal.
const TECH_TERMS: &[&str] = &[
    "ai", "algorithm", "algorithms", "api", "apis", "async", "backend", "benchmark",
    "blockchain", "cache", "cloud", "compiler", "concurrency", "container", "cpu", "css",
    "database", "databases", "deep", "docker", "encryption", "framework", "frameworks",
    "frontend", "golang", "gpu", "graphql", "html", "http", "javascript", "java", "json",
    "kernel", "kotlin", "kubernetes", "latency", "linux", "llm", "llms", "microservices",
    "ml", "neural", "nosql", "postgres", "postgresql", "protocol", "python", "pytorch",
    "react", "redis", "rest", "runtime", "rust", "scala", "sdk", "serverless", "sql",
    "swift", "tensorflow", "throughput", "transformer", "transformers", "typescript",
    "webassembly", "wasm", "算法", "数据库", "框架", "编程", "代码", "人工智能", "机器学习",
    "深度学习", "大模型", "区块链", "云计算",
];

/// Single-token comparative and causal connectives.
const CONNECTIVES: &[&str] = &[
    "compare", "compares", "compared", "comparing", "comparison", "vs", "vs.", "versus",
    "difference", "differences", "affect", "affects", "affected", "impact", "impacts",
    "influence", "influences", "cause", "causes", "caused", "why", "relationship",
    "比较", "对比", "区别", "如何影响", "影响", "导致", "为什么",
];

/// Two-token connectives (`better than`, `lead to`).
const CONNECTIVE_PAIRS: &[(&str, &str)] = &[
    ("better", "than"),
    ("worse", "than"),
    ("faster", "than"),
    ("slower", "than"),
    ("lead", "to"),
    ("leads", "to"),
    ("result", "in"),
    ("results", "in"),
];

/// Chinese connectives and function words. Han text has no spaces, so these
/// are split out of ideograph runs before tokenization.
const HAN_SPLITTERS: &[&str] = &[
    "如何影响", "为什么", "比较", "对比", "区别", "导致", "影响", "什么", "如何", "怎么",
    "的", "是", "和", "与", "及", "吗", "了", "在", "呢",
];

/// Conjunctions that open a new clause.
const CLAUSE_WORDS: &[&str] = &[
    "and", "but", "while", "whereas", "because", "although", "which", "if", "when", "then",
    "so", "而且", "但是", "因为", "如果", "并且",
];

/// Keywords that mark a query as academic.
const ACADEMIC_KEYWORDS: &[&str] = &[
    "research", "paper", "papers", "study", "studies", "theory", "academic", "algorithm",
    "algorithms", "研究", "论文", "学术", "理论", "算法",
];

/// Keywords that mark a query as technical.
const TECHNICAL_KEYWORDS: &[&str] = &[
    "programming", "code", "coding", "developer", "development", "api", "apis", "framework",
    "frameworks", "library", "libraries", "sdk", "编程", "代码", "开发", "框架",
];

/// Keywords that mark a query as business related.
const BUSINESS_KEYWORDS: &[&str] = &[
    "business", "market", "markets", "economy", "economic", "company", "companies",
    "investment", "investing", "startup", "startups", "revenue", "商业", "市场", "经济", "公司",
    "投资",
];

/// Keywords that mark a query as news or trend driven.
const NEWS_KEYWORDS: &[&str] = &[
    "news", "latest", "recent", "trend", "trends", "event", "events", "新闻", "最新", "发展",
    "趋势", "事件",
];

/// Topic area of a query, used to prefer sources that cover it well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainHint {
    /// Papers, studies, algorithms.
    Academic,
    /// Programming and developer tooling.
    Technical,
    /// Markets, companies, investment.
    Business,
    /// Recent events and trends.
    News,
}

impl DomainHint {
    /// All hints, in priority order.
    pub const ALL: [Self; 4] = [Self::Academic, Self::Technical, Self::Business, Self::News];

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::Technical => "technical",
            Self::Business => "business",
            Self::News => "news",
        }
    }

    const fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Academic => ACADEMIC_KEYWORDS,
            Self::Technical => TECHNICAL_KEYWORDS,
            Self::Business => BUSINESS_KEYWORDS,
            Self::News => NEWS_KEYWORDS,
        }
    }
}

impl std::fmt::Display for DomainHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complexity tier of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// One concept, no jargon.
    Simple,
    /// A few concepts or some technical vocabulary.
    Moderate,
    /// Many concepts, clauses or heavy jargon.
    Complex,
    /// Comparative or causal question across two or more concepts.
    MultiHop,
}

impl Tier {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::MultiHop => "multi_hop",
        }
    }

    /// Inclusive `(min, max)` number of query variants for this tier.
    #[must_use]
    pub const fn variant_range(&self) -> (usize, usize) {
        match self {
            Self::Simple => (1, 1),
            Self::Moderate => (2, 3),
            Self::Complex => (3, 5),
            Self::MultiHop => (4, 6),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weights and thresholds of the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Weight of the lexical signal.
    pub lexical_weight: f64,
    /// Weight of the syntactic signal.
    pub syntactic_weight: f64,
    /// Weight of the semantic signal.
    pub semantic_weight: f64,
    /// Scores below this are [`Tier::Simple`].
    pub simple_below: f64,
    /// Scores below this (and not simple) are [`Tier::Moderate`].
    pub moderate_below: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            lexical_weight: 0.3,
            syntactic_weight: 0.3,
            semantic_weight: 0.4,
            simple_below: 0.25,
            moderate_below: 0.5,
        }
    }
}

/// Raw signal values behind a classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    /// Technical-token ratio in `[0, 1]`.
    pub lexical: f64,
    /// Clause/length signal in `[0, 1]`.
    pub syntactic: f64,
    /// Concept/relation signal in `[0, 1]`.
    pub semantic: f64,
    /// Weighted combination of the three.
    pub score: f64,
    /// Whether a connective links two or more concepts.
    pub multi_hop: bool,
}

/// Classification result for one query. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityProfile {
    /// Assigned tier.
    pub tier: Tier,
    /// Distinct concepts in order of appearance.
    pub concepts: Vec<String>,
    /// Standalone questions decomposed from the concepts.
    pub sub_questions: Vec<String>,
    /// Search variants; the first is always the query itself.
    pub variants: Vec<String>,
    /// Whether the multi-hop signal fired.
    pub requires_multi_hop: bool,
    /// Topic areas detected in the concepts, in priority order.
    pub domain_hints: Vec<DomainHint>,
    /// Set when concept extraction found nothing.
    pub fallback: bool,
    /// Signal values.
    pub signals: Signals,
}

/// Deterministic complexity classifier.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    /// Creates a classifier with the given configuration.
    #[must_use]
    pub const fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classifies `query`.
    #[must_use]
    pub fn classify(&self, query: &Query) -> ComplexityProfile {
        let tokens = split_tokens(query.text());
        let analysis = analyze(&tokens);

        if analysis.concepts.is_empty() {
            warn!(query = %query, "no concepts extracted, falling back to simple tier");
            return ComplexityProfile {
                tier: Tier::Simple,
                concepts: Vec::new(),
                sub_questions: Vec::new(),
                variants: vec![query.text().to_string()],
                requires_multi_hop: false,
                domain_hints: Vec::new(),
                fallback: true,
                signals: Signals {
                    lexical: 0.0,
                    syntactic: 0.0,
                    semantic: 0.0,
                    score: 0.0,
                    multi_hop: false,
                },
            };
        }

        let lexical = lexical_signal(&tokens);
        let syntactic = syntactic_signal(query.text(), &tokens);
        let semantic = semantic_signal(analysis.concepts.len(), analysis.relations);
        let score = self.weighted(lexical, syntactic, semantic);
        let multi_hop = analysis.relations > 0 && analysis.concepts.len() >= 2;

        let tier = if multi_hop {
            Tier::MultiHop
        } else if score < self.config.simple_below {
            Tier::Simple
        } else if score < self.config.moderate_below {
            Tier::Moderate
        } else {
            Tier::Complex
        };

        let sub_questions = sub_questions(query, tier, &analysis);
        let variants = variants(query, tier, &analysis.concepts, &sub_questions);
        let domain_hints = domain_hints(&analysis.concepts);

        debug!(
            query = %query,
            %tier,
            lexical,
            syntactic,
            semantic,
            score,
            concepts = analysis.concepts.len(),
            variants = variants.len(),
            ?domain_hints,
            "classified query"
        );

        ComplexityProfile {
            tier,
            concepts: analysis.concepts,
            sub_questions,
            variants,
            requires_multi_hop: multi_hop,
            domain_hints,
            fallback: false,
            signals: Signals {
                lexical,
                syntactic,
                semantic,
                score,
                multi_hop,
            },
        }
    }

    fn weighted(&self, lexical: f64, syntactic: f64, semantic: f64) -> f64 {
        let total =
            self.config.lexical_weight + self.config.syntactic_weight + self.config.semantic_weight;
        if total <= 0.0 {
            return 0.0;
        }
        (self.config.lexical_weight * lexical
            + self.config.syntactic_weight * syntactic
            + self.config.semantic_weight * semantic)
            / total
    }
}

/// Classifies `query` with the default configuration.
#[must_use]
pub fn classify(query: &Query) -> ComplexityProfile {
    Classifier::default().classify(query)
}

/// Concepts and relations found in a token stream.
#[derive(Debug, Default)]
struct Analysis {
    concepts: Vec<String>,
    relations: usize,
    /// Connective token that produced the first relation.
    connective: Option<String>,
}

/// Lowercase tokens with Han connectives split out of ideograph runs.
fn split_tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let spaced = if lowered.chars().any(is_han) {
        space_han_splitters(&lowered)
    } else {
        lowered
    };
    match TOKEN_RE.as_ref() {
        Some(re) => re
            .find_iter(&spaced)
            .map(|m| m.as_str().trim_end_matches(['.', '-']).to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        None => tokenize(&spaced),
    }
}

/// Surrounds every Han splitter with spaces in one left-to-right pass.
/// The longest splitter wins at each position, and a split-out word is
/// never split again (`为什么` stays whole instead of yielding `什么`).
fn space_han_splitters(text: &str) -> String {
    let mut spaced = String::with_capacity(text.len() + 16);
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        let longest = HAN_SPLITTERS
            .iter()
            .filter(|s| rest.starts_with(**s))
            .max_by_key(|s| s.len());
        if let Some(splitter) = longest {
            spaced.push(' ');
            spaced.push_str(splitter);
            spaced.push(' ');
            rest = &rest[splitter.len()..];
        } else {
            spaced.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    spaced
}

fn is_punctuation(token: &str) -> bool {
    token.chars().all(|c| PUNCTUATION.contains(&c))
}

fn flush(run: &mut Vec<&str>, concepts: &mut Vec<String>) {
    if !run.is_empty() {
        let concept = run.join(" ");
        if !concepts.contains(&concept) {
            concepts.push(concept);
        }
        run.clear();
    }
}

fn is_connective_at(tokens: &[String], i: usize) -> usize {
    if CONNECTIVES.contains(&tokens[i].as_str()) {
        return 1;
    }
    if let Some(next) = tokens.get(i + 1)
        && CONNECTIVE_PAIRS
            .iter()
            .any(|(a, b)| tokens[i] == *a && next == b)
    {
        return 2;
    }
    0
}

/// Groups maximal runs of content tokens into concepts. Stopwords,
/// punctuation and connectives end a run; each connective counts as one
/// relation.
fn analyze(tokens: &[String]) -> Analysis {
    let mut analysis = Analysis::default();
    let mut run: Vec<&str> = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        let width = is_connective_at(tokens, i);
        if width > 0 {
            flush(&mut run, &mut analysis.concepts);
            analysis.relations += 1;
            if analysis.connective.is_none() {
                analysis.connective = Some(tokens[i..i + width].join(" "));
            }
            i += width;
            continue;
        }
        let token = tokens[i].as_str();
        if is_punctuation(token)
            || is_stopword(token)
            || CLAUSE_WORDS.contains(&token)
            || is_number(token)
        {
            flush(&mut run, &mut analysis.concepts);
        } else {
            run.push(token);
        }
        i += 1;
    }
    flush(&mut run, &mut analysis.concepts);

    analysis
}

fn is_number(token: &str) -> bool {
    token.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn is_technical(token: &str) -> bool {
    if TECH_TERMS.contains(&token) {
        return true;
    }
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    let has_alpha = token.chars().any(char::is_alphabetic);
    if has_digit && has_alpha {
        return true;
    }
    has_alpha && token.contains(['+', '#', '.', '-'])
}

fn word_count(tokens: &[String]) -> usize {
    tokens.iter().filter(|t| !is_punctuation(t)).count()
}

/// Share of technical tokens among words.
fn lexical_signal(tokens: &[String]) -> f64 {
    let words = word_count(tokens);
    if words == 0 {
        return 0.0;
    }
    let technical = tokens.iter().filter(|t| is_technical(t)).count();
    technical as f64 / words as f64
}

fn syntactic_signal(text: &str, tokens: &[String]) -> f64 {
    let separators = text
        .chars()
        .filter(|c| matches!(c, ',' | ';' | ':' | '，' | '；' | '：'))
        .count();
    let conjunctions = tokens
        .iter()
        .filter(|t| CLAUSE_WORDS.contains(&t.as_str()))
        .count();
    let clauses = 1 + separators + conjunctions;
    let clause_part = ((clauses - 1) as f64 / 3.0).min(1.0);
    let length_part = (word_count(tokens) as f64 / 25.0).min(1.0);
    0.5 * clause_part + 0.5 * length_part
}

fn semantic_signal(concepts: usize, relations: usize) -> f64 {
    let concept_part = (concepts.saturating_sub(1) as f64 / 3.0).min(1.0);
    let relation_part = (relations as f64 / 2.0).min(1.0);
    0.7 * concept_part + 0.3 * relation_part
}

/// Decomposes the concepts into standalone questions.
fn sub_questions(query: &Query, tier: Tier, analysis: &Analysis) -> Vec<String> {
    if tier == Tier::Simple {
        return Vec::new();
    }
    let han = query.text().chars().any(is_han);
    let mut questions: Vec<String> = analysis
        .concepts
        .iter()
        .map(|c| {
            if han {
                format!("什么是{c}")
            } else {
                format!("What is {c}?")
            }
        })
        .collect();

    if let [first, second, ..] = analysis.concepts.as_slice() {
        let relation = relation_question(first, second, analysis.connective.as_deref(), han);
        if let Some(q) = relation {
            questions.push(q);
        }
    }
    questions
}

fn relation_question(a: &str, b: &str, connective: Option<&str>, han: bool) -> Option<String> {
    let connective = connective?;
    let causal = matches!(
        connective,
        "affect"
            | "affects"
            | "affected"
            | "impact"
            | "impacts"
            | "influence"
            | "influences"
            | "cause"
            | "causes"
            | "caused"
            | "why"
            | "lead to"
            | "leads to"
            | "result in"
            | "results in"
            | "如何影响"
            | "影响"
            | "导致"
            | "为什么"
    );
    Some(match (han, causal) {
        (true, true) => format!("{a}如何影响{b}"),
        (true, false) => format!("{a}与{b}的区别"),
        (false, true) => format!("How does {a} affect {b}?"),
        (false, false) => format!("How does {a} compare to {b}?"),
    })
}

/// Topic areas whose keywords appear in `concepts`. Han keywords match
/// inside a concept; other keywords must be a whole word of one.
fn domain_hints(concepts: &[String]) -> Vec<DomainHint> {
    DomainHint::ALL
        .into_iter()
        .filter(|hint| {
            hint.keywords().iter().any(|keyword| {
                concepts.iter().any(|concept| {
                    if keyword.chars().any(is_han) {
                        concept.contains(keyword)
                    } else {
                        concept.split_whitespace().any(|word| word == *keyword)
                    }
                })
            })
        })
        .collect()
}

/// Suffixes appended to a query to search it from another angle.
pub(crate) const fn angle_suffixes(han: bool) -> &'static [&'static str] {
    if han {
        &["最新进展", "实际应用", "详细分析", "优缺点", "案例"]
    } else {
        &[
            "latest developments",
            "practical applications",
            "in-depth analysis",
            "advantages and disadvantages",
            "case studies",
        ]
    }
}

/// Builds the variant list: the query, then sub-questions, then concept
/// templates, padded with suffix templates until the tier's count is met.
fn variants(query: &Query, tier: Tier, concepts: &[String], sub_questions: &[String]) -> Vec<String> {
    let (min, max) = tier.variant_range();
    let wanted = (min + concepts.len().saturating_sub(1)).clamp(min, max);
    let han = query.text().chars().any(is_han);

    let concept_templates = concepts.iter().map(|c| {
        if han {
            format!("{c} 详细介绍")
        } else {
            format!("{c} overview")
        }
    });
    let suffixed = angle_suffixes(han)
        .iter()
        .map(|s| format!("{} {s}", query.text()));

    let mut out: Vec<String> = Vec::with_capacity(wanted);
    let candidates = std::iter::once(query.text().to_string())
        .chain(sub_questions.iter().cloned())
        .chain(concept_templates)
        .chain(suffixed);
    for candidate in candidates {
        if out.len() >= wanted {
            break;
        }
        if !out.iter().any(|v| v.eq_ignore_ascii_case(&candidate)) {
            out.push(candidate);
        }
    }
    out
}
