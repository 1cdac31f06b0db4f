/// The sole analyzer: split on ASCII whitespace, lowercase each token.
/// Token positions are the zero-based token ordinals.
pub fn tokenize(text: &str) -> impl Iterator<Item = (String, u32)> + '_ {
    text.split_ascii_whitespace()
        .enumerate()
        .map(|(pos, token)| (token.to_lowercase(), pos as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_positions() {
        let tokens: Vec<_> = tokenize("The Quick  brown\tFOX").collect();
        assert_eq!(
            tokens,
            vec![
                ("the".to_string(), 0),
                ("quick".to_string(), 1),
                ("brown".to_string(), 2),
                ("fox".to_string(), 3),
            ]
        );
    }

    #[test]
    fn test_tokenize_empty() {
        assert_eq!(tokenize("   ").count(), 0);
        assert_eq!(tokenize("").count(), 0);
    }
}
