//! Keep credentials out of anything a backend error carries or a human sees.
//!
//! Two passes run over a provider body before it is stored: the exact
//! credential used for the request is replaced wherever it appears, then any
//! token that looks like an API key from a known issuer is replaced too.

const MAX_ERROR_BODY_CHARS: usize = 200;

const REDACTED: &str = "[REDACTED]";

/// Key prefixes of the providers we talk to (and a few common neighbours).
const KEY_PREFIXES: [&str; 7] = ["sk-or-", "sk-", "AIza", "hf_", "gsk_", "xoxb-", "xoxp-"];

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

/// Replace every occurrence of `credential` in `input`. Blank credentials are
/// ignored, since replacing them would mangle the whole body.
pub fn redact_credential(input: &str, credential: &str) -> String {
    if credential.trim().is_empty() {
        return input.to_string();
    }
    input.replace(credential, REDACTED)
}

/// Redact a single key-shaped token, if it holds a known prefix followed by
/// at least one more character.
fn redact_token(token: &str, out: &mut String) {
    let hit = KEY_PREFIXES.iter().find_map(|prefix| {
        token
            .find(prefix)
            .filter(|at| token.len() > at + prefix.len())
    });
    match hit {
        Some(at) => {
            out.push_str(&token[..at]);
            out.push_str(REDACTED);
        }
        None => out.push_str(token),
    }
}

/// Redact every token that carries a known API key prefix.
pub fn scrub_key_patterns(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut token_start = None;

    for (i, c) in input.char_indices() {
        match (is_token_char(c), token_start) {
            (true, None) => token_start = Some(i),
            (false, Some(start)) => {
                redact_token(&input[start..i], &mut out);
                token_start = None;
                out.push(c);
            }
            (false, None) => out.push(c),
            (true, Some(_)) => {}
        }
    }
    if let Some(start) = token_start {
        redact_token(&input[start..], &mut out);
    }
    out
}

/// Make a provider body safe to keep in an error: drop `credential`, scrub
/// key-shaped tokens, cap the length.
pub fn sanitize_body(input: &str, credential: &str) -> String {
    let scrubbed = scrub_key_patterns(&redact_credential(input, credential));
    if scrubbed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return scrubbed;
    }
    let kept: String = scrubbed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{}...", kept)
}

/// Render a credential for humans: the last four characters, the rest hidden.
pub fn mask_credential(credential: &str) -> String {
    let count = credential.chars().count();
    if count <= 8 {
        return "*".repeat(count);
    }
    let tail: String = credential.chars().skip(count - 4).collect();
    format!("****{}", tail)
}
