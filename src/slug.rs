//! URL slugs for countries and cities.

const MAX_SLUG_LEN: usize = 64;

/// Lowercase, hyphen-separated ASCII slug. Common Latin accents are folded
/// to their base letter; other non-ASCII characters are dropped.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars().map(fold_accent) {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(ch.to_ascii_lowercase());
            pending_dash = false;
        } else if ch.is_ascii() {
            pending_dash = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Slug derived from a display name, or `None` when the name has no
/// characters that survive [`slugify`].
pub fn derive_slug(name: &str) -> Option<String> {
    let slug = slugify(name);
    (!slug.is_empty()).then_some(slug)
}

fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' | 'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' | 'Ø' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        'ý' | 'ÿ' | 'Ý' => 'y',
        _ => ch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("New York City"), "new-york-city");
        assert_eq!(slugify("  São Paulo  "), "sao-paulo");
        assert_eq!(slugify("Côte d'Ivoire"), "cote-d-ivoire");
        assert_eq!(slugify("--Already--slugged--"), "already-slugged");
    }

    #[test]
    fn test_slugify_drops_unfoldable_characters() {
        assert_eq!(slugify("東京 Tokyo"), "tokyo");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_derive_slug() {
        assert_eq!(derive_slug("Mexico City").as_deref(), Some("mexico-city"));
        assert_eq!(derive_slug("東京"), None);
    }

    #[test]
    fn test_slugify_truncates() {
        let long = "a ".repeat(100);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }
}
