//! Surgical `KEY=value` updates for `.env`-style files.
//!
//! Only the requested keys are touched: an existing assignment has its value replaced in place
//! (first occurrence only, keeping any `export ` prefix and the line ending), a missing key is
//! appended. Every other byte of the file is left as it was, so applying the same entries twice
//! is a no-op.

use regex::{Captures, Regex};

/// Return `text` with each `(key, value)` entry set.
pub fn reconcile(text: &str, entries: &[(&str, &str)]) -> String {
    let mut out = text.to_string();
    for (key, value) in entries {
        out = set_key(&out, key, value);
    }
    out
}

fn assignment(key: &str) -> Regex {
    let pattern = format!(
        r"(?m)^([ \t]*(?:export[ \t]+)?){}[ \t]*=[^\r\n]*",
        regex::escape(key)
    );
    // Keys are escaped, so the pattern is always valid.
    Regex::new(&pattern).unwrap_or_else(|err| unreachable!("bad env key pattern: {err}"))
}

fn set_key(text: &str, key: &str, value: &str) -> String {
    let re = assignment(key);
    if re.is_match(text) {
        return re
            .replacen(text, 1, |caps: &Captures| format!("{}{key}={value}", &caps[1]))
            .into_owned();
    }

    let mut out = String::with_capacity(text.len() + key.len() + value.len() + 2);
    out.push_str(text);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(key);
    out.push('=');
    out.push_str(value);
    out.push('\n');
    out
}

/// Read the value of `key` (first assignment, surrounding quotes stripped).
pub fn get(text: &str, key: &str) -> Option<String> {
    let re = assignment(key);
    let line = re.find(text)?.as_str();
    let (_, value) = line.split_once('=')?;
    let value = value.trim();
    let unquoted = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    Some(unquoted.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0xDef1C0ded9bec7F1a1670819833240f027b25EfF";

    #[test]
    fn replaces_in_place_and_keeps_order() {
        let text = "A=1\nCONTRACT_ADDRESS=old\nB=2\n";
        let out = reconcile(text, &[("CONTRACT_ADDRESS", ADDR)]);
        assert_eq!(out, format!("A=1\nCONTRACT_ADDRESS={ADDR}\nB=2\n"));
    }

    #[test]
    fn appends_when_absent() {
        let out = reconcile("A=1\nB=2", &[("CONTRACT_ADDRESS", ADDR)]);
        assert_eq!(out, format!("A=1\nB=2\nCONTRACT_ADDRESS={ADDR}\n"));
        assert_eq!(out.matches("CONTRACT_ADDRESS=").count(), 1);

        let out = reconcile("", &[("CONTRACT_ADDRESS", ADDR)]);
        assert_eq!(out, format!("CONTRACT_ADDRESS={ADDR}\n"));
    }

    #[test]
    fn idempotent() {
        let entries = [
            ("CONTRACT_ADDRESS", ADDR),
            ("ARBITRUM_RPC_URL", "https://sepolia-rollup.arbitrum.io/rpc"),
        ];
        for text in [
            "",
            "A=1",
            "# comment\nCONTRACT_ADDRESS=\"0x00\"\nPRIVATE_KEY=abc\n",
            "export ARBITRUM_RPC_URL=http://old\r\nX=1\r\n",
        ] {
            let once = reconcile(text, &entries);
            let twice = reconcile(&once, &entries);
            assert_eq!(once, twice, "input: {text:?}");
        }
    }

    #[test]
    fn only_first_occurrence_and_similar_keys_untouched() {
        let text = "MY_CONTRACT_ADDRESS=keep\nCONTRACT_ADDRESS=a\nCONTRACT_ADDRESS=b\n";
        let out = reconcile(text, &[("CONTRACT_ADDRESS", "new")]);
        assert_eq!(
            out,
            "MY_CONTRACT_ADDRESS=keep\nCONTRACT_ADDRESS=new\nCONTRACT_ADDRESS=b\n"
        );
    }

    #[test]
    fn keeps_export_prefix_and_crlf() {
        let text = "export CONTRACT_ADDRESS=old\r\nB=2\r\n";
        let out = reconcile(text, &[("CONTRACT_ADDRESS", "new")]);
        assert_eq!(out, "export CONTRACT_ADDRESS=new\r\nB=2\r\n");
    }

    #[test]
    fn commented_assignments_are_not_matched() {
        let text = "# CONTRACT_ADDRESS=example\n";
        let out = reconcile(text, &[("CONTRACT_ADDRESS", "new")]);
        assert_eq!(out, "# CONTRACT_ADDRESS=example\nCONTRACT_ADDRESS=new\n");
    }

    #[test]
    fn values_with_dollar_signs_are_literal() {
        let out = reconcile("K=old\n", &[("K", "$1abc")]);
        assert_eq!(out, "K=$1abc\n");
    }

    #[test]
    fn get_strips_quotes() {
        let text = "CONTRACT_ADDRESS=\"0xabc\"\nRPC='http://x'\nPLAIN=v\n";
        assert_eq!(get(text, "CONTRACT_ADDRESS").as_deref(), Some("0xabc"));
        assert_eq!(get(text, "RPC").as_deref(), Some("http://x"));
        assert_eq!(get(text, "PLAIN").as_deref(), Some("v"));
        assert_eq!(get(text, "MISSING"), None);
    }
}
