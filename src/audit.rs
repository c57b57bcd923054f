// 🔎 Consistency audits
// Read-only checks over a finalized database: DOI prefixes must agree
// within a proceedings volume, key initials must follow the legacy
// six-initials convention, and author names should not exist in several
// spellings. Nothing here mutates an entry.

use crate::database::{Database, Entry, EntryKey, Person};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// The fixed key grammar: category, colon, letter run, two-digit year,
// optional one-letter suffix
static KEY_GRAMMAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]+:([a-zA-Z]+)[0-9]{2}[a-z]?$").expect("key grammar"));

static ESCAPE_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\.").expect("escape regex"));

/// CHES:CheJoyPai03 was assigned a DOI outside its book's block; it is the
/// one known exception and never counts against its volume.
const DOI_PREFIX_EXCEPTION: &str = "10.1007/10931455_18";

// ============================================================================
// REPORTS
// ============================================================================

/// DOI findings for one proceedings volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeDoiCheck {
    /// Textual key of the proceedings entry (the crossref target)
    pub book: String,

    /// Whether the volume's series requires prefix consistency
    pub prefix_checked: bool,

    /// Distinct DOI prefixes observed, in first-seen order
    pub prefixes: Vec<String>,

    pub entries_with_doi: usize,
    pub entries_total: usize,
}

impl VolumeDoiCheck {
    pub fn is_consistent(&self) -> bool {
        self.prefixes.len() <= 1
    }

    pub fn has_full_coverage(&self) -> bool {
        self.entries_with_doi == self.entries_total
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoiAuditReport {
    pub volumes: Vec<VolumeDoiCheck>,

    /// Volumes whose series required the prefix check
    pub volumes_checked: usize,
    pub volumes_total: usize,
}

impl DoiAuditReport {
    pub fn inconsistent(&self) -> impl Iterator<Item = &VolumeDoiCheck> {
        self.volumes
            .iter()
            .filter(|v| v.prefix_checked && !v.is_consistent())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} out of {} books checked, {} with inconsistent DOI prefixes",
            self.volumes_checked,
            self.volumes_total,
            self.inconsistent().count()
        )
    }
}

/// Key-initials buckets for papers with more than six authors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyInitialsReport {
    /// Papers with more than six authors
    pub papers: usize,

    pub less_than_six: Vec<String>,
    pub exactly_six: Vec<String>,
    pub more_than_six: Vec<String>,
}

impl KeyInitialsReport {
    pub fn summary(&self) -> String {
        format!(
            "{:4} / {:4} papers with >6 authors have <6 initials in key\n\
             {:4} / {:4} papers with >6 authors have =6 initials in key\n\
             {:4} / {:4} papers with >6 authors have >6 initials in key",
            self.less_than_six.len(),
            self.papers,
            self.exactly_six.len(),
            self.papers,
            self.more_than_six.len(),
            self.papers,
        )
    }
}

/// Authors whose stripped names collide: probable duplicate spellings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonVariantReport {
    /// stripped name -> the distinct display forms that collapse onto it
    pub groups: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub doi: DoiAuditReport,
    pub key_initials: KeyInitialsReport,
    pub person_variants: PersonVariantReport,
    pub audited_at: DateTime<Utc>,
}

// ============================================================================
// CONSISTENCY AUDITOR
// ============================================================================

pub struct ConsistencyAuditor {
    /// Restrict audits to one conference/category when set
    pub category_filter: Option<String>,

    /// Also report successful checks
    pub verbose: bool,

    /// Self-archived preprint categories, excluded from the DOI audits
    pub preprint_categories: Vec<String>,

    /// Series value marking volumes that require DOI prefix consistency
    pub prefix_series: String,
}

impl ConsistencyAuditor {
    pub fn new() -> Self {
        ConsistencyAuditor {
            category_filter: None,
            verbose: false,
            preprint_categories: vec!["EPRINT".to_string()],
            prefix_series: "{LNCS}".to_string(),
        }
    }

    /// Run every audit over `db`.
    pub fn audit(&self, db: &Database) -> Result<AuditReport> {
        Ok(AuditReport {
            doi: self.audit_doi_prefixes(db),
            key_initials: self.audit_key_initials(db)?,
            person_variants: self.audit_person_variants(db),
            audited_at: Utc::now(),
        })
    }

    fn in_scope(&self, key: &EntryKey) -> bool {
        if self.preprint_categories.contains(&key.category) {
            return false;
        }
        match &self.category_filter {
            Some(filter) => &key.category == filter,
            None => true,
        }
    }

    // ------------------------------------------------------------------
    // DOI prefix consistency
    // ------------------------------------------------------------------

    /// Group entries by the proceedings volume they reference, and for
    /// volumes in the prefix-checked series compare the DOI prefixes (all
    /// but the final underscore-delimited segment). Disagreements and
    /// partial DOI coverage are reported, never corrected.
    pub fn audit_doi_prefixes(&self, db: &Database) -> DoiAuditReport {
        let mut per_book: IndexMap<String, Vec<&Entry>> = IndexMap::new();

        for (key, entry) in &db.entries {
            if !self.in_scope(key) {
                continue;
            }
            let Some(book) = entry.expanded("crossref", &db.abbrevs) else {
                continue;
            };
            per_book.entry(book).or_default().push(entry);
        }

        let volumes_total = per_book.len();
        let mut volumes_checked = 0;
        let mut volumes = Vec::with_capacity(volumes_total);

        for (book, members) in per_book {
            let prefix_checked = self.is_prefix_checked_series(db, &book);

            let dois: Vec<String> = members
                .iter()
                .filter_map(|e| e.expanded("doi", &db.abbrevs))
                .collect();

            let mut prefixes: Vec<String> = Vec::new();
            if prefix_checked {
                volumes_checked += 1;
                for doi in dois.iter().filter(|d| d.as_str() != DOI_PREFIX_EXCEPTION) {
                    let prefix = doi
                        .rsplit_once('_')
                        .map(|(p, _)| p.to_string())
                        .unwrap_or_default();
                    if !prefixes.contains(&prefix) {
                        prefixes.push(prefix);
                    }
                }
            }

            let check = VolumeDoiCheck {
                book: book.clone(),
                prefix_checked,
                prefixes,
                entries_with_doi: dois.len(),
                entries_total: members.len(),
            };

            if prefix_checked && !check.is_consistent() {
                warn!(
                    book = %book,
                    prefixes = %check.prefixes.join(" "),
                    "inconsistent DOI prefixes within one volume"
                );
            } else if prefix_checked && self.verbose {
                info!(
                    book = %book,
                    prefix = %check.prefixes.first().cloned().unwrap_or_default(),
                    entries = check.entries_with_doi,
                    "DOI prefixes consistent"
                );
            }

            if !check.has_full_coverage() {
                warn!(
                    book = %book,
                    with_doi = check.entries_with_doi,
                    total = check.entries_total,
                    "volume has entries without DOI"
                );
            } else if self.verbose {
                info!(book = %book, total = check.entries_total, "all entries have a DOI");
            }

            volumes.push(check);
        }

        DoiAuditReport {
            volumes,
            volumes_checked,
            volumes_total,
        }
    }

    fn is_prefix_checked_series(&self, db: &Database, book: &str) -> bool {
        db.get_by_name(book)
            .and_then(|e| e.expanded("series", &db.abbrevs))
            .is_some_and(|series| series == self.prefix_series)
    }

    // ------------------------------------------------------------------
    // Key initials
    // ------------------------------------------------------------------

    /// For papers with more than six authors, bucket the key's letter-run
    /// length against the legacy six-initials convention. A key that does
    /// not match the grammar aborts the audit.
    pub fn audit_key_initials(&self, db: &Database) -> Result<KeyInitialsReport> {
        let mut report = KeyInitialsReport::default();

        for (key, entry) in &db.entries {
            if !self.in_scope(key) {
                continue;
            }
            if entry.author_count(&db.abbrevs) <= 6 {
                continue;
            }

            report.papers += 1;
            let text = key.to_string();

            let Some(caps) = KEY_GRAMMAR.captures(&text) else {
                bail!("key {text} cannot be parsed");
            };
            let initials = caps[1].len();

            match initials {
                n if n < 6 => report.less_than_six.push(text),
                6 => report.exactly_six.push(text),
                _ => report.more_than_six.push(text),
            }
        }

        Ok(report)
    }

    // ------------------------------------------------------------------
    // Person variants
    // ------------------------------------------------------------------

    /// Collect every author, strip braces and escapes from the joined name
    /// parts, and report distinct Person values that collapse onto the same
    /// stripped string: these are probably the same person spelled twice.
    pub fn audit_person_variants(&self, db: &Database) -> PersonVariantReport {
        let mut people: Vec<&Person> = Vec::new();
        for (key, entry) in &db.entries {
            if !self.in_scope(key) {
                continue;
            }
            if let Some(authors) = entry.authors() {
                for author in authors {
                    if !people.contains(&author) {
                        people.push(author);
                    }
                }
            }
        }
        people.sort_by_key(|p| p.display_name());

        let mut by_stripped: IndexMap<String, Vec<&Person>> = IndexMap::new();
        for person in people {
            by_stripped
                .entry(stripped_name(person))
                .or_default()
                .push(person);
        }

        let mut report = PersonVariantReport::default();
        for (stripped, persons) in by_stripped {
            if persons.len() > 1 {
                let variants: Vec<String> =
                    persons.iter().map(|p| p.display_name()).collect();
                warn!(
                    name = %stripped,
                    variants = %variants.join(" | "),
                    "multiple spellings of one name"
                );
                report.groups.push((stripped, variants));
            }
        }
        report
    }
}

impl Default for ConsistencyAuditor {
    fn default() -> Self {
        Self::new()
    }
}

fn namestrip(token: &str) -> String {
    let s = token.replace(['{', '}'], "");
    ESCAPE_PAIR.replace_all(&s, "").trim().to_string()
}

fn stripped_name(person: &Person) -> String {
    person
        .first
        .iter()
        .chain(&person.prelast)
        .chain(&person.last)
        .chain(&person.lineage)
        .map(|t| namestrip(t))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Entry, Value};

    fn proceedings(series: Option<&str>) -> Entry {
        let mut entry = Entry::new("proceedings");
        entry
            .fields
            .insert("title".to_string(), Value::text("Proceedings"));
        if let Some(series) = series {
            entry
                .fields
                .insert("series".to_string(), Value::text(series));
        }
        entry
    }

    fn paper_in(book: &str, doi: Option<&str>, n_authors: usize) -> Entry {
        let mut entry = Entry::new("inproceedings");
        entry
            .fields
            .insert("crossref".to_string(), Value::text(book));
        if let Some(doi) = doi {
            entry.fields.insert("doi".to_string(), Value::text(doi));
        }
        entry.persons.insert(
            "author".to_string(),
            (0..n_authors)
                .map(|i| Person::from_parts("X", "", "", &format!("L{i}"), ""))
                .collect(),
        );
        entry
    }

    fn volume_db(dois: &[Option<&str>]) -> Database {
        let mut db = Database::new();
        db.add_entry(
            EntryKey::new("C", "crypto", "99", ""),
            proceedings(Some("{LNCS}")),
        );
        for (i, doi) in dois.iter().enumerate() {
            db.add_entry(
                EntryKey::new("C", &format!("Aaa{}", "b".repeat(i)), "99", ""),
                paper_in("C:crypto99", *doi, 1),
            );
        }
        db
    }

    #[test]
    fn test_consistent_prefixes_report_success() {
        let db = volume_db(&[
            Some("10.1007/3-540-12345_1"),
            Some("10.1007/3-540-12345_2"),
            Some("10.1007/3-540-12345_17"),
        ]);

        let report = ConsistencyAuditor::new().audit_doi_prefixes(&db);
        let volume = &report.volumes[0];

        assert!(volume.prefix_checked);
        assert!(volume.is_consistent());
        assert_eq!(volume.prefixes, vec!["10.1007/3-540-12345"]);
        assert_eq!(report.volumes_checked, 1);
    }

    #[test]
    fn test_disagreeing_prefixes_are_reported() {
        let db = volume_db(&[
            Some("10.1007/3-540-12345_1"),
            Some("10.1007/3-540-12345_2"),
            Some("10.1007/3-540-99999_3"),
        ]);

        let report = ConsistencyAuditor::new().audit_doi_prefixes(&db);
        let volume = &report.volumes[0];

        assert!(!volume.is_consistent());
        assert_eq!(
            volume.prefixes,
            vec!["10.1007/3-540-12345", "10.1007/3-540-99999"]
        );
        assert_eq!(report.inconsistent().count(), 1);
    }

    #[test]
    fn test_exception_doi_does_not_count() {
        let db = volume_db(&[
            Some("10.1007/3-540-12345_1"),
            Some(DOI_PREFIX_EXCEPTION),
        ]);

        let report = ConsistencyAuditor::new().audit_doi_prefixes(&db);
        assert!(report.volumes[0].is_consistent());
    }

    #[test]
    fn test_partial_coverage_is_counted() {
        let db = volume_db(&[Some("10.1007/3-540-12345_1"), None, None]);

        let report = ConsistencyAuditor::new().audit_doi_prefixes(&db);
        let volume = &report.volumes[0];

        assert_eq!(volume.entries_with_doi, 1);
        assert_eq!(volume.entries_total, 3);
        assert!(!volume.has_full_coverage());
    }

    #[test]
    fn test_non_lncs_volume_not_prefix_checked() {
        let mut db = Database::new();
        db.add_entry(EntryKey::new("C", "crypto", "99", ""), proceedings(None));
        db.add_entry(
            EntryKey::new("C", "Aaa", "99", ""),
            paper_in("C:crypto99", Some("10.555/x_1"), 1),
        );

        let report = ConsistencyAuditor::new().audit_doi_prefixes(&db);
        assert!(!report.volumes[0].prefix_checked);
        assert_eq!(report.volumes_checked, 0);
        assert_eq!(report.volumes_total, 1);
    }

    #[test]
    fn test_key_initials_buckets() {
        let mut db = Database::new();
        // 5, 6 and 7 authors with letter runs of length 5, 6, 7
        db.add_entry(EntryKey::new("C", "ABCDE", "99", ""), paper_in("b", None, 7));
        db.add_entry(EntryKey::new("C", "ABCDEF", "99", ""), paper_in("b", None, 7));
        db.add_entry(
            EntryKey::new("C", "ABCDEFG", "99", ""),
            paper_in("b", None, 7),
        );
        // Not audited: six authors only
        db.add_entry(EntryKey::new("C", "ABCDEX", "99", ""), paper_in("b", None, 6));

        let report = ConsistencyAuditor::new().audit_key_initials(&db).unwrap();

        assert_eq!(report.papers, 3);
        assert_eq!(report.less_than_six, vec!["C:ABCDE99"]);
        assert_eq!(report.exactly_six, vec!["C:ABCDEF99"]);
        assert_eq!(report.more_than_six, vec!["C:ABCDEFG99"]);
        assert_eq!(
            report.less_than_six.len() + report.exactly_six.len() + report.more_than_six.len(),
            report.papers
        );
    }

    #[test]
    fn test_key_initials_suffix_allowed_by_grammar() {
        let mut db = Database::new();
        db.add_entry(
            EntryKey::new("C", "ABCDEFG", "99", "a"),
            paper_in("b", None, 7),
        );
        let report = ConsistencyAuditor::new().audit_key_initials(&db).unwrap();
        assert_eq!(report.more_than_six, vec!["C:ABCDEFG99a"]);
    }

    #[test]
    fn test_unparsable_key_is_a_hard_error() {
        let mut db = Database::new();
        // The sentinel segment "???" falls outside the audit grammar
        db.add_entry(EntryKey::new("C", "???", "99", ""), paper_in("b", None, 7));

        let err = ConsistencyAuditor::new()
            .audit_key_initials(&db)
            .unwrap_err();
        assert!(err.to_string().contains("cannot be parsed"));
    }

    #[test]
    fn test_person_variants_group_braced_spellings() {
        let mut db = Database::new();
        let mut entry_a = Entry::new("inproceedings");
        entry_a.persons.insert(
            "author".to_string(),
            vec![Person::from_parts("Ada", "", "", "Lovelace", "")],
        );
        let mut entry_b = Entry::new("inproceedings");
        entry_b.persons.insert(
            "author".to_string(),
            vec![Person::from_parts("Ada", "", "", "{Lovelace}", "")],
        );
        db.add_entry(EntryKey::new("C", "Lov", "85", ""), entry_a);
        db.add_entry(EntryKey::new("C", "Lov", "86", ""), entry_b);

        let report = ConsistencyAuditor::new().audit_person_variants(&db);

        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].0, "Ada Lovelace");
        assert_eq!(report.groups[0].1.len(), 2);
    }

    #[test]
    fn test_person_variants_ignore_single_spelling() {
        let mut db = Database::new();
        let mut entry = Entry::new("inproceedings");
        entry.persons.insert(
            "author".to_string(),
            vec![Person::from_parts("Ada", "", "", "Lovelace", "")],
        );
        db.add_entry(EntryKey::new("C", "Lov", "85", ""), entry);

        let report = ConsistencyAuditor::new().audit_person_variants(&db);
        assert!(report.groups.is_empty());
    }

    #[test]
    fn test_category_filter_scopes_audits() {
        let mut db = volume_db(&[Some("10.1007/3-540-12345_1")]);
        // An EPRINT entry referencing the same book must be ignored
        db.add_entry(
            EntryKey::new("EPRINT", "Zzz", "99", ""),
            paper_in("C:crypto99", Some("10.999/other_1"), 1),
        );

        let report = ConsistencyAuditor::new().audit_doi_prefixes(&db);
        assert!(report.volumes[0].is_consistent());
        assert_eq!(report.volumes[0].entries_total, 1);
    }
}
