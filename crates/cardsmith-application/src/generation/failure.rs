//! User-facing wording for failed generation runs.

use cardsmith_core::error::CardsmithError;
use once_cell::sync::Lazy;
use regex::Regex;

static TRANSIENT_FAILURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)timeout|timed out|connection reset|\b50[24]\b|gateway|network")
        .expect("Valid regex pattern")
});

pub const RETRY_HINT: &str =
    "The generation service timed out or dropped the connection. Shorten the input and retry.";

/// Turns a generation error into the message shown to the user.
///
/// Timeout and gateway failures are recognized by their wording, whichever
/// variant carries them. Other transport errors, such as a refused
/// connection, keep their own message since shorter input would not help.
pub fn describe_failure(err: &CardsmithError) -> String {
    let text = err.to_string();
    if TRANSIENT_FAILURE.is_match(&text) {
        return RETRY_HINT.to_string();
    }
    text
}
