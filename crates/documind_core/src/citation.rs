use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static PAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Page (\d+(?:,\s*\d+)*)\]").expect("page marker pattern is valid")
});

/// Extract the page numbers cited as `[Page N]` or `[Page N, M, ...]` in an answer.
///
/// Numbers are deduplicated across the whole text and returned ascending.
/// Numbers too large for a page index are ignored.
pub fn extract_citations(text: &str) -> Vec<u32> {
    let mut pages = BTreeSet::new();

    for cap in PAGE_MARKER.captures_iter(text) {
        let Some(list) = cap.get(1) else { continue };
        for number in list.as_str().split(',') {
            if let Ok(page) = number.trim().parse::<u32>() {
                pages.insert(page);
            }
        }
    }

    pages.into_iter().collect()
}
