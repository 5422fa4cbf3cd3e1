//! Credential redaction for datasource strings.
//!
//! Only the first match in the input is masked.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MASK: &str = "****";

// Alternatives, in priority order:
//   user:password@
//   user=... password=...
//   password=... user=...
static CREDENTIAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(Datasource:\s*)?(\S+):(\S+)@|(Datasource:.*\s)?(user=\S+).*\s(password=\S+)|(Datasource:.*\s)?(password=\S+).*\s(user=\S+)",
    )
    .expect("credential regex")
});

/// Capture groups holding a `user:password@` password
const PASSWORD_GROUPS: [usize; 1] = [3];
/// Capture groups holding `user=`/`password=` tokens
const KEY_VALUE_GROUPS: [usize; 4] = [5, 6, 8, 9];

/// Replace the credentials of the first datasource found in `input` with `****`.
///
/// `root:secret@tcp(127.0.0.1:3306)/mydb` becomes
/// `root:****@tcp(127.0.0.1:3306)/mydb`; `user=app password=pw host=db`
/// becomes `user=**** password=**** host=db`. Text without credentials is
/// returned unchanged.
pub fn mask_credentials(input: &str) -> String {
    let Some(caps) = CREDENTIAL_RE.captures(input) else {
        return input.to_string();
    };

    let mut spans: Vec<(usize, usize, String)> = Vec::new();
    for idx in PASSWORD_GROUPS {
        if let Some(m) = caps.get(idx) {
            spans.push((m.start(), m.end(), MASK.to_string()));
        }
    }
    for idx in KEY_VALUE_GROUPS {
        if let Some(m) = caps.get(idx) {
            spans.push((m.start(), m.end(), mask_key_value(m.as_str())));
        }
    }
    spans.sort_by_key(|(start, _, _)| *start);

    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    for (start, end, replacement) in spans {
        out.push_str(&input[cursor..start]);
        out.push_str(&replacement);
        cursor = end;
    }
    out.push_str(&input[cursor..]);
    out
}

fn mask_key_value(token: &str) -> String {
    match token.split_once('=') {
        Some((key, _)) => format!("{key}={MASK}"),
        None => MASK.to_string(),
    }
}
