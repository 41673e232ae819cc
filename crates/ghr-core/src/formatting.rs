//! Slack mrkdwn helpers.

/// Escape text for Slack mrkdwn.
///
/// Slack only requires `&`, `<` and `>` to be encoded; everything else is
/// literal.
pub fn escape_mrkdwn(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// `<url|label>` link syntax.
pub fn slack_link(url: &str, label: &str) -> String {
    format!("<{url}|{label}>")
}

/// First line of a (commit) message.
pub fn first_line(text: &str) -> &str {
    let line = text.split('\n').next().unwrap_or("");
    line.trim_end_matches('\r')
}

/// Keep at most `max` lines, joined back with `\n`.
pub fn truncate_lines(text: &str, max: usize) -> String {
    text.split('\n')
        .take(max)
        .map(|l| l.trim_end_matches('\r'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Abbreviated commit id (first 7 characters).
pub fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(7) {
        Some((idx, _)) => &sha[..idx],
        None => sha,
    }
}

/// Unit word for a counter: singular iff `count == 1`.
pub fn unit<'a>(count: u64, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 {
        singular
    } else {
        plural
    }
}

/// Last `/`-separated segment of a git ref (`refs/heads/main` -> `main`).
pub fn ref_short_name(git_ref: &str) -> &str {
    git_ref.rsplit('/').next().unwrap_or(git_ref)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_characters_only() {
        assert_eq!(escape_mrkdwn("a < b && c > *d*"), "a &lt; b &amp;&amp; c &gt; *d*");
    }

    #[test]
    fn truncates_to_three_lines() {
        assert_eq!(truncate_lines("1\n2\n3\n4\n5", 3), "1\n2\n3");
        assert_eq!(truncate_lines("1\r\n2", 3), "1\n2");
        assert_eq!(truncate_lines("only", 3), "only");
        assert_eq!(truncate_lines("", 3), "");
    }

    #[test]
    fn short_sha_and_first_line() {
        assert_eq!(short_sha("0123456789abcdef"), "0123456");
        assert_eq!(short_sha("abc"), "abc");
        assert_eq!(first_line("Fix bug\r\n\nDetails"), "Fix bug");
    }

    #[test]
    fn unit_words() {
        assert_eq!(unit(1, "commit", "commits"), "commit");
        assert_eq!(unit(0, "addition", "additions"), "additions");
        assert_eq!(unit(5, "deletion", "deletions"), "deletions");
    }

    #[test]
    fn ref_names() {
        assert_eq!(ref_short_name("refs/heads/main"), "main");
        assert_eq!(ref_short_name("refs/heads/feature/x"), "x");
        assert_eq!(ref_short_name("main"), "main");
    }
}
