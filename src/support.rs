//! Support handoff — pre-filled deep link into the external chat channel.
//!
//! Help/error/stuck clicks hand the user a link; nothing is sent from the
//! server and no response is consumed.

use crate::sequences::step::StepKey;
use crate::store::model::PageEventKind;

/// Build the deep link for a support-worthy event.
pub fn support_link(base: &str, email: &str, step: StepKey, kind: PageEventKind) -> String {
    let message = format!("[{}] {email} needs a hand at step {step}", kind.as_str());
    format!("{base}?text={}", percent_encode(&message))
}

/// Minimal query-component percent-encoding (RFC 3986 unreserved set).
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_carries_step_and_email() {
        let link = support_link(
            "https://t.me/daybreak_support",
            "ada@example.com",
            "v1-e-5".parse().unwrap(),
            PageEventKind::StuckClick,
        );
        assert!(link.starts_with("https://t.me/daybreak_support?text="));
        assert!(link.contains("v1-e-5"));
        assert!(link.contains("ada%40example.com"));
        assert!(!link.contains(' '));
    }

    #[test]
    fn percent_encoding_is_uppercase_hex() {
        assert_eq!(percent_encode("a b"), "a%20b");
        assert_eq!(percent_encode("x@y"), "x%40y");
        assert_eq!(percent_encode("safe-._~"), "safe-._~");
    }
}
