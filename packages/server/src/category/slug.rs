use std::collections::HashSet;

/// Maximum stored slug length (characters).
pub const MAX_SLUG_LEN: usize = 255;

/// Room left for a `-N` disambiguation suffix when deriving from a name.
const BASE_SLUG_LEN: usize = MAX_SLUG_LEN - 16;

/// Used when a name has no alphanumeric characters at all.
const FALLBACK_SLUG: &str = "category";

/// Derive a URL slug from free text.
///
/// Lowercases, keeps Unicode alphanumerics, collapses every other run of
/// characters into a single `-` and trims separators from both ends.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.push(c);
        } else {
            pending_sep = true;
        }
    }

    slug
}

/// Slug used as the starting point for a category called `name`.
pub fn base_slug(name: &str) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        return FALLBACK_SLUG.to_string();
    }
    if slug.chars().count() <= BASE_SLUG_LEN {
        return slug;
    }
    let truncated: String = slug.chars().take(BASE_SLUG_LEN).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Whether a client-supplied slug is already in canonical form.
pub fn is_canonical(slug: &str) -> bool {
    !slug.is_empty() && slug.chars().count() <= MAX_SLUG_LEN && slugify(slug) == slug
}

/// First of `base`, `base-2`, `base-3`, ... not present in `taken`.
pub fn first_available(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2u64..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| format!("{base}-{}", uuid::Uuid::new_v4().simple()))
}
