// 🔤 Name normalization
// Canonicalizes one name fragment (accents, LaTeX escapes, punctuation)
// into an ASCII-letters-only string safe for key comparison.

use deunicode::deunicode;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

// An escape introducer gobbles up the character following it
static ESCAPE_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\.").expect("escape regex"));

/// Return `fragment` reduced to ASCII letters only.
///
/// Steps, in order:
/// 1. transliterate raw non-ASCII characters to their nearest ASCII form
///    (most accents arrive LaTeX-escaped, but not all);
/// 2. expand the few escape macros whose letters must survive:
///    `\ss` is a ringel-s ("Gro{\ss}" -> "Gross"), `\O`/`\o` are slashed Os,
///    `\textcommabelow` contributes nothing;
/// 3. strip every remaining escape together with the character after it;
/// 4. drop everything that is not an ASCII letter: braces, parentheses,
///    apostrophes ("O'Neill"), hyphens ("Hall-Andersen"), tildes, spaces.
///
/// A '.' surviving steps 2-3 signals an escape form this table does not
/// know; it is reported and processing continues.
pub fn normalize_name_part(fragment: &str) -> String {
    let mut s = deunicode(fragment);

    s = s.replace("\\ss", "ss");
    s = s.replace("\\textcommabelow", "");
    s = s.replace("\\O", "O");
    s = s.replace("\\o", "o");

    s = ESCAPE_PAIR.replace_all(&s, "").into_owned();

    if s.contains('.') {
        warn!(fragment, "spurious '.' left after normalization");
    }

    s.chars().filter(char::is_ascii_alphabetic).collect()
}

// ============================================================================
// TESTS
// ============================================================================
