//! Turning user input into identifiers.

use crate::Pmid;

/// Split uploaded text into raw identifier tokens.
///
/// Newlines count as commas, so one-per-line files, comma-separated lists
/// and mixtures of both all work. Tokens are returned untrimmed; blank ones
/// are kept and dropped later by [`normalize_identifiers`].
pub fn parse_identifier_text(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .replace('\n', ",")
        .split(',')
        .map(str::to_string)
        .collect()
}

/// Trim every token and drop the ones left empty.
///
/// Blank tokens are not identifiers, so they are skipped silently and
/// never reported as unfetched. Order and duplicates are preserved.
pub fn normalize_identifiers<I, S>(raw: I) -> Vec<Pmid>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|token| Pmid::parse(token.as_ref()))
        .collect()
}
