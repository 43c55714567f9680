/// Edit distance at or below which two titles are treated as the same series.
pub const DEFAULT_THRESHOLD: usize = 3;

const STRIPPED_CHARS: &[char] = &['-', ':', '_', '\''];

/// Fold a title down to the form used for comparison.
///
/// "  The  Title's-Name: Test_ " -> "the titles name test"
pub fn normalize(title: Option<&str>) -> String {
    let Some(title) = title else {
        return String::new();
    };

    title
        .to_lowercase()
        .replace(STRIPPED_CHARS, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Levenshtein distance between two strings, ignoring case.
pub fn distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (curr[j] + 1).min(prev[j + 1] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Return the first candidate whose normalized form is within `threshold`
/// edits of `new_title`.
///
/// Candidates are scanned in order and the scan stops at the first hit, so a
/// closer candidate further down the list never wins over an earlier one.
pub fn find_similar<'a, S>(new_title: &str, candidates: &'a [S], threshold: usize) -> Option<&'a S>
where
    S: AsRef<str>,
{
    let target = normalize(Some(new_title));

    candidates
        .iter()
        .find(|candidate| distance(&target, &normalize(Some(candidate.as_ref()))) <= threshold)
}
