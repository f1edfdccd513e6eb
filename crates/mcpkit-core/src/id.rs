//! Random identifiers.

/// Mint a random session id suitable for URLs and HTTP headers.
#[must_use]
pub fn random_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct_and_header_safe() {
        let a = random_session_id();
        let b = random_session_id();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
