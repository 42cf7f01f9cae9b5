//! Masking of API keys in log lines and error text

/// Mask a token for display
///
/// Shows the first and last 3 characters; short tokens are fully masked.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }

    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Replace every occurrence of `secret` in `text` with its masked form
pub fn redact(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, &mask_token(secret))
}
