//! Gram normalization.
//!
//! Index-time analysis may rewrite text (lower-casing, folding). Candidate
//! n-grams are passed through the same normalization so extracted leaves
//! match what the index stores.

/// Rewrites a candidate n-gram; `None` drops it.
pub trait GramNormalizer: Send + Sync {
    fn normalize(&self, gram: &str) -> Option<String>;
}

impl<F> GramNormalizer for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn normalize(&self, gram: &str) -> Option<String> {
        self(gram)
    }
}

/// Lower-cases every gram.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lowercase;

impl GramNormalizer for Lowercase {
    fn normalize(&self, gram: &str) -> Option<String> {
        Some(gram.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase() {
        assert_eq!(Lowercase.normalize("AbC").as_deref(), Some("abc"));
        assert_eq!(Lowercase.normalize("ÉTÉ").as_deref(), Some("été"));
    }

    #[test]
    fn closures_are_normalizers() {
        let skip_digits = |gram: &str| {
            if gram.chars().any(|c| c.is_ascii_digit()) {
                None
            } else {
                Some(gram.to_string())
            }
        };
        assert_eq!(skip_digits.normalize("abc").as_deref(), Some("abc"));
        assert_eq!(skip_digits.normalize("a1c"), None);
    }
}
