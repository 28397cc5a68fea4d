//! Truncation Utilities
//!
//! Bounded views of long text for log lines and record notes. Cuts always
//! land on UTF-8 boundaries.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationPolicy {
    Bytes(usize),
    Chars(usize),
}

impl TruncationPolicy {
    fn fits(&self, content: &str) -> bool {
        match self {
            TruncationPolicy::Bytes(b) => content.len() <= *b,
            TruncationPolicy::Chars(c) => content.chars().count() <= *c,
        }
    }

    /// Largest prefix end (byte index) whose cost is within `budget`.
    fn prefix_end(&self, content: &str, budget: usize) -> usize {
        let mut end = 0;
        for (count, (idx, c)) in content.char_indices().enumerate() {
            let char_end = idx + c.len_utf8();
            let cost = match self {
                TruncationPolicy::Bytes(_) => char_end,
                TruncationPolicy::Chars(_) => count + 1,
            };
            if cost > budget {
                break;
            }
            end = char_end;
        }
        end
    }

    fn budget(&self) -> usize {
        match self {
            TruncationPolicy::Bytes(b) | TruncationPolicy::Chars(b) => *b,
        }
    }
}

/// Keep the head and tail of `content`, eliding the middle. Used for
/// prompts and replies in debug logs.
pub fn truncate_text(content: &str, policy: TruncationPolicy) -> String {
    if policy.fits(content) {
        return content.to_string();
    }
    let half = policy.budget() / 2;
    if half == 0 {
        return format!("... [{} bytes truncated] ...", content.len());
    }

    let prefix_end = policy.prefix_end(content, half);
    let reversed: String = content.chars().rev().collect();
    let suffix_len = policy.prefix_end(&reversed, half);
    let suffix_start = content.len().saturating_sub(suffix_len).max(prefix_end);

    let prefix = &content[..prefix_end];
    let suffix = &content[suffix_start..];
    let dropped = content.len() - prefix.len() - suffix.len();
    format!("{} ... [{} bytes truncated] ... {}", prefix, dropped, suffix)
}

/// The first `max_chars` characters of `content`.
pub fn head_chars(content: &str, max_chars: usize) -> &str {
    let end = TruncationPolicy::Chars(max_chars).prefix_end(content, max_chars);
    &content[..end]
}
