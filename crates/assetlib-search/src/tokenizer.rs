/// Tokens shorter than this many characters are dropped.
pub const MIN_TOKEN_CHARS: usize = 3;

/// Lower-cased word tokens in order of appearance, duplicates kept.
///
/// Anything that is not alphanumeric or `_` separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();

    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            cur.extend(ch.to_lowercase());
        } else if !cur.is_empty() {
            push_token(&mut out, &mut cur);
        }
    }
    if !cur.is_empty() {
        push_token(&mut out, &mut cur);
    }

    out
}

fn push_token(out: &mut Vec<String>, cur: &mut String) {
    if cur.chars().count() >= MIN_TOKEN_CHARS {
        out.push(std::mem::take(cur));
    } else {
        cur.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_non_word_and_lowercases() {
        assert_eq!(
            tokenize("Primary-Button, with_icon! (v2)"),
            vec!["primary", "button", "with_icon"]
        );
    }

    #[test]
    fn test_keeps_duplicates() {
        assert_eq!(tokenize("card card CARD"), vec!["card", "card", "card"]);
    }

    #[test]
    fn test_short_tokens_dropped_by_chars_not_bytes() {
        assert_eq!(tokenize("ab été"), vec!["été"]);
        assert!(tokenize("a an").is_empty());
    }
}
