// 🔀 Key disambiguation
// Recomputes every entry's candidate key and resolves collisions with the
// "", a, b, ... suffix ladder, building a new database so the one being
// iterated is never renamed under its own iterator.

use crate::database::{Database, EntryKey};
use crate::keys::KeyDeriver;
use anyhow::{bail, Result};

pub struct Disambiguator {
    deriver: KeyDeriver,
}

impl Disambiguator {
    pub fn new() -> Self {
        Disambiguator {
            deriver: KeyDeriver::new(),
        }
    }

    pub fn with_deriver(deriver: KeyDeriver) -> Self {
        Disambiguator { deriver }
    }

    /// Derive fresh keys for every entry of `db`, in insertion order, and
    /// return a new database with unique keys.
    ///
    /// Collision policy, checked in order:
    /// 1. neither KEY nor KEYa taken: insert under KEY;
    /// 2. KEY taken with an empty suffix: the earlier entry becomes KEYa,
    ///    the new one KEYb;
    /// 3. KEY free but KEYa taken: first free suffix among b, c, ...
    ///
    /// Suffixes record discovery order. Running past "z" for one
    /// (category, author-segment, year) triple is an error, never a
    /// wrap-around.
    pub fn rederive_keys(&mut self, db: &Database) -> Result<Database> {
        let mut new_db = Database {
            abbrevs: db.abbrevs.clone(),
            entries: Default::default(),
        };

        for (key, entry) in &db.entries {
            let Some(authors) = entry.authors() else {
                // No structured author list: the key is kept as-is
                new_db.add_entry(key.clone(), entry.clone());
                continue;
            };

            let auth = self.deriver.authors_abbreviation(authors);
            let mut new_key = EntryKey::new(&key.category, &auth, &key.year, "");
            let key_a = new_key.with_dis("a");

            if let Some(existing) = new_db.entries.shift_remove(&new_key) {
                // First collision: KEY becomes KEYa, the newcomer KEYb
                new_db.add_entry(key_a, existing);
                new_key.dis = "b".to_string();
            } else if new_db.entries.contains_key(&key_a) {
                // Same authors and year again: first unused suffix
                new_key.dis = "b".to_string();
                while new_db.entries.contains_key(&new_key) {
                    let Some(cur) = new_key.dis.chars().next() else {
                        break;
                    };
                    if cur >= 'z' {
                        bail!(
                            "disambiguation space exhausted for {}:{}{}",
                            new_key.category,
                            new_key.auth,
                            new_key.year
                        );
                    }
                    new_key.dis = ((cur as u8 + 1) as char).to_string();
                }
            }

            new_db.add_entry(new_key, entry.clone());
        }

        Ok(new_db)
    }
}

impl Default for Disambiguator {
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
    use crate::database::{Entry, Person, Value};

    fn entry_with_authors(lastnames: &[&str]) -> Entry {
        let mut entry = Entry::new("inproceedings");
        entry.fields.insert("title".to_string(), Value::text("T"));
        entry.persons.insert(
            "author".to_string(),
            lastnames
                .iter()
                .map(|l| Person::from_parts("X", "", "", l, ""))
                .collect(),
        );
        entry
    }

    fn db_with_colliding_entries(n: usize) -> Database {
        let mut db = Database::new();
        for i in 0..n {
            // Source keys only need to be distinct; the author segments all
            // collide on X:Abc99
            db.add_entry(
                EntryKey::new("X", &format!("Src{i}"), "99", ""),
                entry_with_authors(&["Abc"]),
            );
        }
        db
    }

    fn keys_of(db: &Database) -> Vec<String> {
        db.entries.keys().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_no_collision_keeps_empty_suffix() {
        let mut db = Database::new();
        db.add_entry(
            EntryKey::new("C", "Old", "87", ""),
            entry_with_authors(&["Chaum", "Crepeau", "Damgard"]),
        );

        let new_db = Disambiguator::new().rederive_keys(&db).unwrap();
        assert_eq!(keys_of(&new_db), vec!["C:ChaCreDam87"]);
    }

    #[test]
    fn test_three_collisions_resolve_to_a_b_c() {
        let db = db_with_colliding_entries(3);
        let new_db = Disambiguator::new().rederive_keys(&db).unwrap();

        let mut keys = keys_of(&new_db);
        keys.sort();
        assert_eq!(keys, vec!["X:Abc99a", "X:Abc99b", "X:Abc99c"]);
    }

    #[test]
    fn test_fourth_collision_takes_d() {
        let db = db_with_colliding_entries(4);
        let new_db = Disambiguator::new().rederive_keys(&db).unwrap();

        let mut keys = keys_of(&new_db);
        keys.sort();
        assert_eq!(keys, vec!["X:Abc99a", "X:Abc99b", "X:Abc99c", "X:Abc99d"]);
    }

    #[test]
    fn test_suffixes_follow_insertion_order() {
        // The first-seen entry ends up under "a", the second under "b", ...
        let mut db = Database::new();
        for (i, title) in ["first", "second", "third"].iter().enumerate() {
            let mut entry = entry_with_authors(&["Abc"]);
            entry
                .fields
                .insert("title".to_string(), Value::text(title));
            db.add_entry(EntryKey::new("X", &format!("Src{i}"), "99", ""), entry);
        }

        let new_db = Disambiguator::new().rederive_keys(&db).unwrap();
        let abbrevs = Default::default();

        for (dis, title) in [("a", "first"), ("b", "second"), ("c", "third")] {
            let key: EntryKey = format!("X:Abc99{dis}").parse().unwrap();
            let entry = new_db.entries.get(&key).unwrap();
            assert_eq!(entry.expanded("title", &abbrevs).unwrap(), title);
        }
    }

    #[test]
    fn test_suffix_space_exhaustion_is_an_error() {
        // 26 colliding entries fill a..z; the 27th must fail loudly
        let ok = Disambiguator::new()
            .rederive_keys(&db_with_colliding_entries(26))
            .unwrap();
        assert_eq!(ok.entries.len(), 26);

        let err = Disambiguator::new()
            .rederive_keys(&db_with_colliding_entries(27))
            .unwrap_err();
        assert!(err.to_string().contains("disambiguation space exhausted"));
    }

    #[test]
    fn test_entry_without_authors_keeps_old_key() {
        let mut db = Database::new();
        let mut proc_entry = Entry::new("proceedings");
        proc_entry
            .fields
            .insert("title".to_string(), Value::text("Proceedings"));
        db.add_entry(EntryKey::new("C", "crypto", "87", ""), proc_entry);

        let new_db = Disambiguator::new().rederive_keys(&db).unwrap();
        assert_eq!(keys_of(&new_db), vec!["C:crypto87"]);
    }

    #[test]
    fn test_source_database_is_untouched() {
        let db = db_with_colliding_entries(2);
        let before = keys_of(&db);
        let _ = Disambiguator::new().rederive_keys(&db).unwrap();
        assert_eq!(keys_of(&db), before);
    }
}
