// 🔑 Key derivation
// Builds the author-abbreviation segment of a citation key from an ordered
// author list. The warn-once bookkeeping lives on the engine, not in
// process-global state.

use crate::database::Person;
use crate::normalize::normalize_name_part;
use std::collections::HashSet;
use tracing::{error, warn};

/// Key segment produced when an entry has no author at all.
pub const NO_AUTHOR_SENTINEL: &str = "???";

// ============================================================================
// MANY-AUTHORS POLICY
// ============================================================================

/// Abbreviation rule for author lists longer than three names.
/// Isolated behind a trait because the six-initials rule is a legacy
/// convention of this index, not a general algorithm.
pub trait ManyAuthorsPolicy {
    fn abbreviate(&self, authors: &[Person]) -> String;
}

/// Legacy rule: the normalized first letter of the (von-stripped) last name
/// of the first six authors only. Authors beyond the sixth are ignored.
pub struct SixInitialsPolicy;

impl ManyAuthorsPolicy for SixInitialsPolicy {
    fn abbreviate(&self, authors: &[Person]) -> String {
        authors
            .iter()
            .take(6)
            .filter_map(|a| {
                let token = a.last.first()?;
                normalize_name_part(token).chars().next()
            })
            .collect()
    }
}

// ============================================================================
// KEY DERIVER
// ============================================================================

/// Derives the author segment of candidate entry keys.
pub struct KeyDeriver {
    policy: Box<dyn ManyAuthorsPolicy>,

    /// Names already reported as oddly cased, once per distinct Person value
    warned_odd_names: HashSet<Person>,
}

impl KeyDeriver {
    pub fn new() -> Self {
        Self::with_policy(Box::new(SixInitialsPolicy))
    }

    pub fn with_policy(policy: Box<dyn ManyAuthorsPolicy>) -> Self {
        KeyDeriver {
            policy,
            warned_odd_names: HashSet::new(),
        }
    }

    /// Key form of a single author's name: one normalized initial per von
    /// token, then the normalized last name.
    pub fn author_abbreviation(&mut self, author: &Person) -> String {
        let lastname = normalize_name_part(&author.last_text());

        let starts_upper = lastname
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase());
        if !starts_upper && self.warned_odd_names.insert(author.clone()) {
            warn!(
                lastname = %lastname,
                person = %author.display_name(),
                "odd lastname"
            );
        }

        let von: String = author
            .prelast
            .iter()
            .filter_map(|tok| normalize_name_part(tok).chars().next())
            .collect();

        format!("{von}{lastname}")
    }

    /// The author segment of a candidate key, from the full ordered list:
    /// one author keeps the whole abbreviation, two or three contribute
    /// three letters each, anything longer falls to the many-authors policy.
    pub fn authors_abbreviation(&mut self, authors: &[Person]) -> String {
        if authors.is_empty() {
            error!("entry with no author; key segment replaced by {NO_AUTHOR_SENTINEL}");
            return NO_AUTHOR_SENTINEL.to_string();
        }

        if authors.len() == 1 {
            return self.author_abbreviation(&authors[0]);
        }

        if authors.len() <= 3 {
            return authors
                .iter()
                .map(|a| {
                    self.author_abbreviation(a)
                        .chars()
                        .take(3)
                        .collect::<String>()
                })
                .collect();
        }

        self.policy.abbreviate(authors)
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn person(first: &str, prelast: &str, last: &str) -> Person {
        Person::from_parts(first, "", prelast, last, "")
    }

    #[test]
    fn test_single_author_keeps_full_lastname() {
        let mut deriver = KeyDeriver::new();
        let shamir = person("Adi", "", "Shamir");
        assert_eq!(deriver.authors_abbreviation(&[shamir]), "Shamir");
    }

    #[test]
    fn test_von_contributes_initials() {
        let mut deriver = KeyDeriver::new();
        let p = person("Paul", "van", "Oorschot");
        assert_eq!(deriver.author_abbreviation(&p), "vOorschot");

        let p = person("X", "van der", "Berg");
        assert_eq!(deriver.author_abbreviation(&p), "vdBerg");
    }

    #[test]
    fn test_two_or_three_authors_take_three_letters_each() {
        let mut deriver = KeyDeriver::new();
        let authors = [
            person("David", "", "Chaum"),
            person("Claude", "", "Crepeau"),
            person("Ivan", "", "Damgard"),
        ];
        assert_eq!(deriver.authors_abbreviation(&authors), "ChaCreDam");

        let pair = [person("A", "", "Bellare"), person("B", "", "ONeill")];
        assert_eq!(deriver.authors_abbreviation(&pair), "BelONe");
    }

    #[test]
    fn test_more_than_three_authors_first_six_initials_only() {
        let mut deriver = KeyDeriver::new();
        let authors: Vec<Person> = ["Aa", "Bb", "Cc", "Dd", "Ee", "Ff", "Gg", "Hh"]
            .iter()
            .map(|l| person("X", "", l))
            .collect();
        // Authors beyond the sixth are ignored by the legacy rule
        assert_eq!(deriver.authors_abbreviation(&authors), "ABCDEF");
    }

    #[test]
    fn test_many_authors_strip_von() {
        let mut deriver = KeyDeriver::new();
        let mut authors: Vec<Person> = ["Aa", "Bb", "Cc"].iter().map(|l| person("X", "", l)).collect();
        authors.push(person("P", "van", "Oorschot"));
        // von initials do not appear in the >3-author form
        assert_eq!(deriver.authors_abbreviation(&authors), "ABCO");
    }

    #[test]
    fn test_no_author_yields_sentinel() {
        let mut deriver = KeyDeriver::new();
        assert_eq!(deriver.authors_abbreviation(&[]), NO_AUTHOR_SENTINEL);
    }

    #[test]
    fn test_deterministic() {
        let mut deriver = KeyDeriver::new();
        let authors = [person("A", "", "Alpha"), person("B", "", "Beta")];
        let first = deriver.authors_abbreviation(&authors);
        let second = deriver.authors_abbreviation(&authors);
        assert_eq!(first, second);
    }

    #[test]
    fn test_odd_lastname_warned_once_per_person() {
        let mut deriver = KeyDeriver::new();
        let odd = person("A", "", "d'Alembert");

        deriver.author_abbreviation(&odd);
        deriver.author_abbreviation(&odd);
        assert_eq!(deriver.warned_odd_names.len(), 1);

        let other = person("B", "", "al-Khwarizmi");
        deriver.author_abbreviation(&other);
        assert_eq!(deriver.warned_odd_names.len(), 2);
    }

    #[test]
    fn test_accents_normalized_in_key() {
        let mut deriver = KeyDeriver::new();
        let p = person("Claude", "", "Cr{\\'e}peau");
        assert_eq!(deriver.author_abbreviation(&p), "Crepeau");
    }
}
