// 📚 Bibliographic data model
// Person / Value / Entry / EntryKey / Database as handed over by the
// external bibtex parser. Entry order is significant: it is the tie-break
// order for key disambiguation and for first-match DOI reconciliation.

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

// ============================================================================
// PERSON
// ============================================================================

/// One author, as ordered word-token lists per name part.
///
/// Person is an immutable value: the same value may back several co-authored
/// entries, so nothing here mutates in place. Corrections (lineage fixing)
/// return a new Person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Person {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub first: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middle: Vec<String>,

    /// von part ("van", "de", "von"), preceding the family name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prelast: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last: Vec<String>,

    /// Suffix ("Jr.", "III") following the family name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lineage: Vec<String>,
}

fn tokens(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

fn join(parts: &[String]) -> String {
    parts.join(" ")
}

// Lineage tokens hiding at the end of a brace-grouped last name,
// e.g. "{Van Oorschot Jr.}"
static TRAILING_LINEAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" (Jr\.|Sr\.|II|III|IV)\}?$").expect("trailing lineage regex"));

static BARE_LINEAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(II|III|IV)$").expect("bare lineage regex"));

static SIMPLE_BRACED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{[A-Za-z]*\}$").expect("braced name regex"));

impl Person {
    /// Build a Person from whitespace-separated part strings.
    /// Empty strings yield empty token lists.
    pub fn from_parts(first: &str, middle: &str, prelast: &str, last: &str, lineage: &str) -> Self {
        Person {
            first: tokens(first),
            middle: tokens(middle),
            prelast: tokens(prelast),
            last: tokens(last),
            lineage: tokens(lineage),
        }
    }

    pub fn last_text(&self) -> String {
        join(&self.last)
    }

    pub fn lineage_text(&self) -> String {
        join(&self.lineage)
    }

    /// Bibliographic display form: "von Last, Lineage, First Middle".
    /// This is the shape the metadata query expects for the author field.
    pub fn display_name(&self) -> String {
        let mut s = String::new();
        if !self.last.is_empty() {
            let mut von_last = self.prelast.clone();
            von_last.extend(self.last.iter().cloned());
            s.push_str(&join(&von_last));
        }
        if !self.lineage.is_empty() {
            s.push_str(", ");
            s.push_str(&join(&self.lineage));
        }
        if !self.first.is_empty() || !self.middle.is_empty() {
            s.push_str(", ");
            let mut given = self.first.clone();
            given.extend(self.middle.iter().cloned());
            s.push_str(&join(&given));
        }
        s
    }

    /// Return a Person with trailing "Jr."/"Sr."/"II"/"III"/"IV" tokens moved
    /// from a brace-grouped last name into the lineage part. The input is
    /// never touched; callers must replace their references explicitly.
    pub fn with_fixed_lineage(&self) -> Person {
        let mut p = self.clone();
        let mut moves = 0;

        while TRAILING_LINEAGE.is_match(&p.last_text()) {
            let Some(token) = p.last.last().cloned() else {
                break;
            };
            // Only brace-grouped tokens can carry an embedded lineage
            let Some(idx) = token.rfind(' ') else {
                break;
            };
            if !token.ends_with('}') {
                break;
            }
            p.lineage.push(token[idx + 1..token.len() - 1].to_string());
            let n = p.last.len();
            p.last[n - 1] = format!("{}}}", &token[..idx]);
            moves += 1;
        }

        if BARE_LINEAGE.is_match(&p.last_text()) {
            warn!(person = %p.display_name(), "lineage token is the whole last name");
        }

        if moves > 0 {
            // The braces may no longer group anything: "{Oorschot}" -> "Oorschot"
            if p.last.len() == 1 && SIMPLE_BRACED.is_match(&p.last[0]) {
                let inner = p.last[0][1..p.last[0].len() - 1].to_string();
                p.last[0] = inner;
            }
            debug!(
                from = %format!("{} {}", self.last_text(), self.lineage_text()).trim(),
                to = %format!("{}, {}", p.last_text(), p.lineage_text()),
                "moved lineage out of last name"
            );
        }

        p
    }
}

// ============================================================================
// FIELD VALUES (macro-expandable text)
// ============================================================================

/// One piece of a field value: literal text, or a reference into the
/// abbreviation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValuePart {
    Text(String),
    Abbrev(String),
}

/// An expandable field value (ordered parts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value(pub Vec<ValuePart>);

impl Value {
    pub fn text(s: &str) -> Self {
        Value(vec![ValuePart::Text(s.to_string())])
    }

    pub fn abbrev(name: &str) -> Self {
        Value(vec![ValuePart::Abbrev(name.to_string())])
    }

    /// Resolve every part against the abbreviation table.
    /// Unknown abbreviations expand to their own name.
    pub fn expand(&self, abbrevs: &HashMap<String, String>) -> String {
        let mut out = String::new();
        for part in &self.0 {
            match part {
                ValuePart::Text(s) => out.push_str(s),
                ValuePart::Abbrev(name) => match abbrevs.get(name) {
                    Some(s) => out.push_str(s),
                    None => out.push_str(name),
                },
            }
        }
        out
    }
}

// ============================================================================
// ENTRY KEY
// ============================================================================

/// Composite citation key: `category:authYY[dis]`.
///
/// `dis` is the disambiguation suffix ("", "a", "b", ...); uniqueness within
/// a Database is guaranteed by the Disambiguator, not by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub category: String,
    pub auth: String,
    /// Two-digit year, kept as text to preserve leading zeros
    pub year: String,
    pub dis: String,
}

static ENTRY_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9]+):([A-Za-z?]+)([0-9]{2})([a-z]?)$").expect("entry key regex")
});

impl EntryKey {
    pub fn new(category: &str, auth: &str, year: &str, dis: &str) -> Self {
        EntryKey {
            category: category.to_string(),
            auth: auth.to_string(),
            year: year.to_string(),
            dis: dis.to_string(),
        }
    }

    /// Same key with a different disambiguation suffix.
    pub fn with_dis(&self, dis: &str) -> EntryKey {
        EntryKey {
            dis: dis.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}{}", self.category, self.auth, self.year, self.dis)
    }
}

impl FromStr for EntryKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let caps = ENTRY_KEY
            .captures(s)
            .ok_or_else(|| anyhow!("entry key {s:?} does not match category:authYY[dis]"))?;
        Ok(EntryKey::new(&caps[1], &caps[2], &caps[3], &caps[4]))
    }
}

impl Serialize for EntryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// ENTRY
// ============================================================================

/// One bibliography record: a type tag, expandable fields, and ordered
/// person lists per role ("author", "editor").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entry {
    pub entry_type: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub persons: IndexMap<String, Vec<Person>>,
}

impl Entry {
    pub fn new(entry_type: &str) -> Self {
        Entry {
            entry_type: entry_type.to_string(),
            fields: IndexMap::new(),
            persons: IndexMap::new(),
        }
    }

    pub fn authors(&self) -> Option<&[Person]> {
        self.persons.get("author").map(Vec::as_slice)
    }

    /// Expanded text of a field, when present.
    pub fn expanded(&self, field: &str, abbrevs: &HashMap<String, String>) -> Option<String> {
        self.fields.get(field).map(|v| v.expand(abbrevs))
    }

    /// Resolved author count: the structured person list when present,
    /// otherwise the " and "-separated author field, otherwise zero.
    pub fn author_count(&self, abbrevs: &HashMap<String, String>) -> usize {
        if let Some(authors) = self.authors() {
            return authors.len();
        }
        match self.expanded("author", abbrevs) {
            Some(s) if !s.trim().is_empty() => s.split(" and ").count(),
            _ => 0,
        }
    }

    /// Display name of the first author, for metadata queries.
    pub fn first_author_name(&self, abbrevs: &HashMap<String, String>) -> String {
        if let Some(author) = self.authors().and_then(|a| a.first()) {
            return author.display_name();
        }
        match self.expanded("author", abbrevs) {
            Some(s) => s.split(" and ").next().unwrap_or("").trim().to_string(),
            None => String::new(),
        }
    }
}

// ============================================================================
// DATABASE
// ============================================================================

/// The whole index: an insertion-ordered key -> entry map plus the
/// abbreviation table field values expand against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub abbrevs: HashMap<String, String>,

    #[serde(default)]
    pub entries: IndexMap<EntryKey, Entry>,
}

impl Database {
    pub fn new() -> Self {
        Database::default()
    }

    pub fn add_entry(&mut self, key: EntryKey, entry: Entry) {
        self.entries.insert(key, entry);
    }

    /// Look an entry up by its textual key (e.g. a crossref field value).
    pub fn get_by_name(&self, name: &str) -> Option<&Entry> {
        let key: EntryKey = name.parse().ok()?;
        self.entries.get(&key)
    }

    /// Apply lineage fixing to every author, returning a new database with
    /// updated person references. Entry order and keys are untouched.
    pub fn with_fixed_lineages(&self) -> Database {
        let mut db = self.clone();
        for entry in db.entries.values_mut() {
            if let Some(authors) = entry.persons.get_mut("author") {
                for author in authors.iter_mut() {
                    *author = author.with_fixed_lineage();
                }
            }
        }
        db
    }

    /// Read a database from its JSON handoff form.
    pub fn load(path: &Path) -> Result<Database> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading database {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("decoding database {}", path.display()))
    }

    /// Write the database back out as JSON, preserving entry order.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("encoding database")?;
        std::fs::write(path, data)
            .with_context(|| format!("writing database {}", path.display()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
