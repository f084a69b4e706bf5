//! URL slugs for categories and products.

use unicode_normalization::UnicodeNormalization;

/// Convert `text` into a URL slug.
///
/// Text is NFKD-normalized first, so accented letters keep their ASCII base
/// (`é` becomes `e`). Keeps ASCII letters, digits, `_` and `-`; lowercases;
/// turns runs of whitespace and hyphens into a single `-`; trims `-` and `_`
/// from both ends. Anything else left after normalization is dropped.
///
/// ```
/// use bozor_core::slug::slugify;
///
/// assert_eq!(slugify("Erkaklar  kiyimi"), "erkaklar-kiyimi");
/// assert_eq!(slugify("  -Choy & Qahva- "), "choy-qahva");
/// assert_eq!(slugify("Café Crème"), "cafe-creme");
/// ```
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for ch in text.nfkd() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch == '-' || ch.is_whitespace() {
            pending_dash = true;
        }
    }

    slug.trim_matches(|c| c == '-' || c == '_').to_owned()
}

/// Slug with a numeric suffix, used when the plain slug is already taken.
///
/// `attempt` 1 returns the base slug unchanged; 2 gives `base-2`, and so on.
#[must_use]
pub fn with_suffix(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        base.to_owned()
    } else {
        format!("{base}-{attempt}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("a -  - b"), "a-b");
        assert_eq!(slugify("a\t\nb"), "a-b");
    }

    #[test]
    fn test_slugify_drops_punctuation_and_non_ascii() {
        assert_eq!(slugify("O'zbek choyi!"), "ozbek-choyi");
        assert_eq!(slugify("Кофе arabica"), "arabica");
    }

    #[test]
    fn test_slugify_folds_accents() {
        assert_eq!(slugify("Café"), "cafe");
        assert_eq!(slugify("Oʻzbekiston Ğalla"), "ozbekiston-galla");
        assert_eq!(slugify("ﬁle"), "file");
    }

    #[test]
    fn test_slugify_trims_edges() {
        assert_eq!(slugify("__hidden__"), "hidden");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_slugify_keeps_inner_underscores() {
        assert_eq!(slugify("snake_case name"), "snake_case-name");
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(with_suffix("choy", 1), "choy");
        assert_eq!(with_suffix("choy", 3), "choy-3");
    }
}
