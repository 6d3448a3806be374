//! Gold/system mention diff data
//!
//! Turns a scorer comparison file into per-document span payloads for the
//! two viewer panes, plus the display configuration of the rendering widget.
//!
//! Comparison file blocks:
//! ```text
//! #BeginOfDocument doc1
//! 1	E1	3,4	Attack	Actual	|	E7	3,4	Attack	Generic	1.0
//! 2	E2	9	Die	Actual	|	-	-	-	-	-
//! 3	-	-	-	-	|	E9	12	Attack	Actual	-
//! #EndOfDocument
//! ```
//! Mentions are expressed in token ids; token tables map them to character
//! offsets of the source text.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{Colors, PrepareOptions};
use crate::output::{self, Manifest, PrepareSummary};
use crate::payload::Side;
use crate::store::AnnotationStore;

pub const MISSING_SUFFIX: &str = "_miss";
pub const PARTIAL_SUFFIX: &str = "_part";
pub const WRONG_STATUS_SUFFIX: &str = "_wrong_status";
pub const REALIS_MISMATCH_ATTR: &str = "realis_wrong";
pub const TYPE_MISMATCH_ATTR: &str = "type_wrong";

const BEGIN_OF_DOCUMENT: &str = "#BeginOfDocument";
const END_OF_DOCUMENT: &str = "#EndOfDocument";
const COMMENT_MARKER: char = '#';
const SIDE_SEPARATOR: &str = "\t|\t";
const TOKEN_JOINER: char = ',';
const ABSENT: &str = "-";

/// An event mention on one side of the comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    pub event_id: String,
    pub tokens: Vec<String>,
    pub mention_type: String,
    pub realis: String,
}

/// A scored gold-system mention pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    pub gold: usize,
    pub system: usize,
    pub score: f64,
}

/// All mentions of one document, both sides, with their alignment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentComparison {
    pub doc_id: String,
    pub gold: Vec<Mention>,
    pub system: Vec<Mention>,
    pub alignments: Vec<Alignment>,
}

struct ComparisonLine {
    gold: Option<Mention>,
    system: Option<Mention>,
    score: Option<f64>,
}

/// Fields: event id, token ids, type, realis. A `-` id marks an absent side.
fn parse_mention(fields: &[&str]) -> Result<Option<Mention>> {
    match fields.first() {
        None => return Ok(None),
        Some(&id) if id == ABSENT => return Ok(None),
        Some(_) => {}
    }
    if fields.len() < 4 {
        anyhow::bail!("expected 4 mention fields, got {}", fields.len());
    }
    Ok(Some(Mention {
        event_id: fields[0].to_string(),
        tokens: fields[1]
            .split(TOKEN_JOINER)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
        mention_type: fields[2].to_string(),
        realis: fields[3].to_string(),
    }))
}

fn parse_comparison_line(line: &str) -> Result<ComparisonLine> {
    let (gold_part, system_part) = line
        .split_once(SIDE_SEPARATOR)
        .context("missing gold/system separator")?;

    // First gold column is a line id
    let gold_fields: Vec<&str> = gold_part.split('\t').skip(1).collect();
    let system_parts: Vec<&str> = system_part.split('\t').collect();
    let (score, system_fields) = system_parts
        .split_last()
        .context("empty system part")?;

    let score = match score.trim() {
        ABSENT => None,
        s => Some(s.parse::<f64>().with_context(|| format!("invalid score '{}'", s))?),
    };

    Ok(ComparisonLine {
        gold: parse_mention(&gold_fields)?,
        system: parse_mention(system_fields)?,
        score,
    })
}

/// Parse a comparison file into per-document mention lists
pub fn parse_comparison<R: BufRead>(reader: R) -> Result<Vec<DocumentComparison>> {
    let mut documents = Vec::new();
    let mut current: Option<DocumentComparison> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();

        if line.starts_with(COMMENT_MARKER) {
            if let Some(doc_id) = line.strip_prefix(BEGIN_OF_DOCUMENT) {
                if let Some(open) = current.take() {
                    log::warn!("Document {} was not closed before the next one", open.doc_id);
                }
                current = Some(DocumentComparison {
                    doc_id: doc_id.trim().to_string(),
                    ..Default::default()
                });
            } else if line.starts_with(END_OF_DOCUMENT) {
                match current.take() {
                    Some(doc) => documents.push(doc),
                    None => log::warn!("Unmatched {} at line {}", END_OF_DOCUMENT, line_no + 1),
                }
            }
            continue;
        }
        if line.is_empty() {
            continue;
        }

        let Some(doc) = current.as_mut() else {
            anyhow::bail!("Line {} is outside of any document block", line_no + 1);
        };
        let parsed = parse_comparison_line(line)
            .with_context(|| format!("Malformed comparison line {}", line_no + 1))?;

        match (&parsed.gold, &parsed.system, parsed.score) {
            (Some(_), Some(_), Some(score)) => doc.alignments.push(Alignment {
                gold: doc.gold.len(),
                system: doc.system.len(),
                score,
            }),
            (_, _, Some(_)) => {
                log::debug!("Ignoring score on one-sided line {} of {}", line_no + 1, doc.doc_id)
            }
            _ => {}
        }
        doc.gold.extend(parsed.gold);
        doc.system.extend(parsed.system);
    }

    if let Some(open) = current {
        log::warn!("Document {} has no {} marker, skipped", open.doc_id, END_OF_DOCUMENT);
    }
    Ok(documents)
}

/// Token id -> character span `[begin, end)` in the source text
pub type TokenMap = HashMap<String, (usize, usize)>;

/// Parse a token table (header line first, tab-separated rows).
///
/// `offset_fields` name the begin and inclusive end columns.
pub fn parse_token_table<R: BufRead>(reader: R, offset_fields: [usize; 2]) -> Result<TokenMap> {
    let mut tokens = TokenMap::new();

    for (line_no, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() < 4 {
            log::debug!("Weird token line {}: {}", line_no + 1, line);
            continue;
        }

        let offsets = (
            fields.get(offset_fields[0]).and_then(|f| f.trim().parse::<usize>().ok()),
            fields.get(offset_fields[1]).and_then(|f| f.trim().parse::<usize>().ok()),
        );
        match offsets {
            (Some(begin), Some(end)) => {
                tokens.insert(fields[0].to_string(), (begin, end + 1));
            }
            _ => log::warn!("Bad token offsets at line {}: {}", line_no + 1, line),
        }
    }

    Ok(tokens)
}

/// Read a token table; a missing file yields an empty map
pub fn read_token_table(path: &Path, offset_fields: [usize; 2]) -> Result<TokenMap> {
    if !path.exists() {
        log::debug!("Cannot find token file at {}", path.display());
        return Ok(TokenMap::new());
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open token file: {}", path.display()))?;
    parse_token_table(BufReader::new(file), offset_fields)
        .with_context(|| format!("Failed to read token file: {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    Number(u64),
    Text(String),
}

/// Sort key comparing digit runs numerically ("t2" < "t10")
fn natural_key(s: &str) -> Vec<KeyPart> {
    let mut parts = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        let is_digit = c.is_ascii_digit();
        let mut run = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() != is_digit {
                break;
            }
            run.push(c);
            chars.next();
        }
        match run.parse::<u64>() {
            Ok(n) if is_digit => parts.push(KeyPart::Number(n)),
            _ => parts.push(KeyPart::Text(run)),
        }
    }
    parts
}

/// Numeric part of a token id ("t12" -> 12)
fn token_number(token: &str) -> Option<u64> {
    natural_key(token).into_iter().rev().find_map(|part| match part {
        KeyPart::Number(n) => Some(n),
        KeyPart::Text(_) => None,
    })
}

/// Character spans covering a mention's tokens.
///
/// Tokens are grouped into runs of consecutive ids; each run becomes one
/// span, so discontinuous mentions produce several spans.
pub fn token_spans(tokens: &[String], token_map: &TokenMap) -> Vec<[usize; 2]> {
    let mut sorted: Vec<&String> = tokens.iter().collect();
    sorted.sort_by_cached_key(|t| natural_key(t));
    sorted.dedup();

    let mut runs: Vec<Vec<&String>> = Vec::new();
    let mut previous: Option<u64> = None;
    for token in sorted {
        let number = token_number(token);
        let contiguous = matches!((previous, number), (Some(p), Some(n)) if n == p + 1);
        previous = number;
        if contiguous {
            if let Some(run) = runs.last_mut() {
                run.push(token);
                continue;
            }
        }
        runs.push(vec![token]);
    }

    runs.iter()
        .filter_map(|run| {
            let offsets: Vec<(usize, usize)> = run
                .iter()
                .filter_map(|token| {
                    let found = token_map.get(token.as_str()).copied();
                    if found.is_none() {
                        log::warn!("Token {} not found in token table", token);
                    }
                    found
                })
                .collect();
            let first = offsets.first()?;
            let last = offsets.last()?;
            Some([first.0, last.1])
        })
        .collect()
}

/// Hands out `<prefix><n>` ids, one per distinct key
struct IdAllocator {
    prefix: &'static str,
    next: usize,
    assigned: HashMap<String, String>,
}

impl IdAllocator {
    fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: 1,
            assigned: HashMap::new(),
        }
    }

    fn id_for(&mut self, key: String) -> String {
        if let Some(id) = self.assigned.get(&key) {
            return id.clone();
        }
        let id = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        self.assigned.insert(key, id.clone());
        id
    }
}

/// How a mention fared against the other side
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MatchStatus {
    /// Span overlap score of the best pairing (0 when unmatched)
    pub score: f64,
    pub mapped: bool,
    pub type_matches: bool,
    pub realis_matches: bool,
}

impl MatchStatus {
    /// Mention type as shown by the widget, suffixed by match quality
    pub fn display_type(&self, mention_type: &str) -> String {
        if self.score <= 0.0 {
            format!("{}{}", mention_type, MISSING_SUFFIX)
        } else if self.score < 1.0 {
            format!("{}{}", mention_type, PARTIAL_SUFFIX)
        } else if !self.type_matches || !self.realis_matches {
            format!("{}{}", mention_type, WRONG_STATUS_SUFFIX)
        } else {
            mention_type.to_string()
        }
    }
}

/// Match status of every gold and system mention
pub fn match_statuses(doc: &DocumentComparison) -> (Vec<MatchStatus>, Vec<MatchStatus>) {
    let mut gold = vec![MatchStatus::default(); doc.gold.len()];
    let mut system = vec![MatchStatus::default(); doc.system.len()];

    for alignment in &doc.alignments {
        let (Some(g_mention), Some(s_mention)) =
            (doc.gold.get(alignment.gold), doc.system.get(alignment.system))
        else {
            continue;
        };
        let type_matches = g_mention.mention_type == s_mention.mention_type;
        let realis_matches = g_mention.realis == s_mention.realis;

        for status in [&mut gold[alignment.gold], &mut system[alignment.system]] {
            status.score = alignment.score;
            status.mapped = true;
            status.type_matches |= type_matches;
            status.realis_matches |= realis_matches;
        }
    }

    (gold, system)
}

pub type Trigger = (String, String, Vec<[usize; 2]>);
pub type Attribute = (String, String, String);
pub type EventEntry = (String, String, Vec<Value>);

/// Span payload for one pane, in the widget's document data shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BratDocument {
    pub text: String,
    pub triggers: Vec<Trigger>,
    pub attributes: Vec<Attribute>,
    pub events: Vec<EventEntry>,
}

pub fn build_brat_document(
    text: &str,
    mentions: &[Mention],
    statuses: &[MatchStatus],
    token_map: &TokenMap,
) -> BratDocument {
    let mut text_bound_ids = IdAllocator::new("T");
    let mut attribute_ids = IdAllocator::new("A");
    let mut document = BratDocument {
        text: text.to_string(),
        triggers: Vec::with_capacity(mentions.len()),
        attributes: Vec::new(),
        events: Vec::with_capacity(mentions.len()),
    };

    for (mention, status) in mentions.iter().zip(statuses) {
        let spans = token_spans(&mention.tokens, token_map);
        let text_bound_id = text_bound_ids.id_for(format!("{:?}", spans));
        let event_id = mention.event_id.clone();

        let realis_id = attribute_ids.id_for(format!(
            "realis|{}|{}|{}",
            mention.realis, text_bound_id, event_id
        ));

        if status.mapped && !status.realis_matches {
            let id = attribute_ids.id_for(format!("{}|{}", REALIS_MISMATCH_ATTR, realis_id));
            document
                .attributes
                .push((id, REALIS_MISMATCH_ATTR.to_string(), event_id.clone()));
        }
        if status.mapped && !status.type_matches {
            let id = attribute_ids.id_for(format!("{}|{}", TYPE_MISMATCH_ATTR, event_id));
            document
                .attributes
                .push((id, TYPE_MISMATCH_ATTR.to_string(), event_id.clone()));
        }

        document.triggers.push((
            text_bound_id.clone(),
            status.display_type(&mention.mention_type),
            spans,
        ));
        document
            .attributes
            .push((realis_id, mention.realis.clone(), event_id.clone()));
        document.events.push((event_id, text_bound_id, Vec::new()));
    }

    document
}

/// Gold and system payloads of one document
pub fn build_diff(
    doc: &DocumentComparison,
    text: &str,
    token_map: &TokenMap,
) -> (BratDocument, BratDocument) {
    let (gold_status, system_status) = match_statuses(doc);
    (
        build_brat_document(text, &doc.gold, &gold_status, token_map),
        build_brat_document(text, &doc.system, &system_status, token_map),
    )
}

/// Capitalize the first letter of each alphabetic run, lowercase the rest
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Display configuration: four entity styles per mention type and one
/// attribute style per realis value
pub fn annotation_config(
    mention_types: &BTreeSet<String>,
    realis_types: &BTreeSet<String>,
    colors: &Colors,
) -> Value {
    let mut event_types = Vec::with_capacity(mention_types.len() * 4);
    for mention_type in mention_types {
        for (suffix, color) in [
            ("", &colors.basic),
            (PARTIAL_SUFFIX, &colors.partial),
            (MISSING_SUFFIX, &colors.missing),
            (WRONG_STATUS_SUFFIX, &colors.wrong_status),
        ] {
            event_types.push(json!({
                "type": format!("{}{}", mention_type, suffix),
                "labels": [mention_type, mention_type],
                "bgColor": color,
                "borderColor": "darken",
            }));
        }
    }

    let mut attribute_types = vec![
        json!({
            "type": "NOT_ANNOTATED",
            "values": {"NOT_ANNOTATED": {"glyph": "N/A"}},
            "bool": "NOT_ANNOTATED",
        }),
        json!({
            "type": REALIS_MISMATCH_ATTR,
            "values": {REALIS_MISMATCH_ATTR: {"glyph": " ★ "}},
            "bool": REALIS_MISMATCH_ATTR,
        }),
        json!({
            "type": TYPE_MISMATCH_ATTR,
            "values": {TYPE_MISMATCH_ATTR: {"glyph": " ✘ "}},
            "bool": TYPE_MISMATCH_ATTR,
        }),
    ];
    for realis in realis_types {
        let name = title_case(realis);
        attribute_types.push(json!({
            "type": realis,
            "values": {name.clone(): {"glyph": name.clone()}},
            "bool": name,
        }));
    }

    json!({
        "event_types": event_types,
        "event_attribute_types": attribute_types,
    })
}

/// Inputs of the diff preparation
#[derive(Debug, Clone)]
pub struct DiffInputs<'a> {
    pub comparison: &'a Path,
    pub token_dir: &'a Path,
    pub text_dir: &'a Path,
    pub options: &'a PrepareOptions,
    pub colors: &'a Colors,
}

/// Write span payloads, document list and display configuration
pub fn prepare_diff(inputs: &DiffInputs<'_>, store: &AnnotationStore) -> Result<PrepareSummary> {
    if !inputs.text_dir.is_dir() {
        anyhow::bail!("Cannot find text directory: {}", inputs.text_dir.display());
    }
    if !inputs.token_dir.is_dir() {
        log::warn!(
            "Cannot find token directory {}, mentions will have no spans",
            inputs.token_dir.display()
        );
    }

    let file = std::fs::File::open(inputs.comparison).with_context(|| {
        format!("Failed to open comparison file: {}", inputs.comparison.display())
    })?;
    let documents = parse_comparison(BufReader::new(file))?;
    log::info!(
        "Parsed {} documents from {}",
        documents.len(),
        inputs.comparison.display()
    );
    log::info!("Generating visualization data at {}", store.root().display());

    let mut mention_types = BTreeSet::new();
    let mut realis_types = BTreeSet::new();
    for mention in documents.iter().flat_map(|d| d.gold.iter().chain(&d.system)) {
        mention_types.insert(mention.mention_type.clone());
        realis_types.insert(mention.realis.clone());
    }

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents")?
            .progress_chars("=>-"),
    );
    let counter = AtomicUsize::new(0);

    let written = documents
        .par_iter()
        .map(|doc| {
            let result = prepare_document(doc, inputs, store);
            let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
            pb.set_position(done as u64);
            result
        })
        .collect::<Result<Vec<_>>>()?;

    pb.finish_and_clear();

    output::write_json(&written, store.doc_ids_path(), false)?;
    output::write_json(
        &annotation_config(&mention_types, &realis_types, inputs.colors),
        store.annotation_config_path(),
        true,
    )?;
    output::write_json(
        &Manifest::new("prepare-diff", written.len(), Vec::new()),
        store.manifest_path(),
        true,
    )?;

    log::info!(
        "Diff data written for {} documents ({} mention types, {} realis values)",
        written.len(),
        mention_types.len(),
        realis_types.len()
    );

    Ok(PrepareSummary {
        written,
        skipped: Vec::new(),
    })
}

fn prepare_document(
    doc: &DocumentComparison,
    inputs: &DiffInputs<'_>,
    store: &AnnotationStore,
) -> Result<String> {
    let text_path = inputs
        .text_dir
        .join(format!("{}{}", doc.doc_id, inputs.options.source_ext));
    let text = std::fs::read_to_string(&text_path)
        .with_context(|| format!("Cannot locate original text: {}", text_path.display()))?;

    let token_path = inputs
        .token_dir
        .join(format!("{}{}", doc.doc_id, inputs.options.token_ext));
    let token_map = read_token_table(&token_path, inputs.options.token_offset_fields)?;

    let (gold, system) = build_diff(doc, &text, &token_map);
    output::write_json(&gold, store.span_path(&doc.doc_id, Side::Gold), true)?;
    output::write_json(&system, store.span_path(&doc.doc_id, Side::System), true)?;

    Ok(doc.doc_id.clone())
}
