//! Weighted topic-tag scoring.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use noteforge_shared::TagSet;

use crate::markdown::strip_markdown;

const MAX_TAGS: usize = 10;
const PLATFORM_WEIGHT: u32 = 8;
const TITLE_WEIGHT: u32 = 5;
const SUMMARY_WEIGHT: u32 = 1;

/// URL substring → platform tag.
const PLATFORM_TAGS: &[(&str, &str)] = &[
    ("youtube.com", "YouTube"),
    ("youtu.be", "YouTube"),
    ("bilibili.com", "Bilibili"),
    ("b23.tv", "Bilibili"),
    ("vimeo.com", "Vimeo"),
    ("ted.com", "TED"),
    ("coursera.org", "Coursera"),
    ("github.com", "GitHub"),
    ("twitch.tv", "Twitch"),
];

const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "before", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has",
    "have", "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "more",
    "most", "my", "no", "not", "of", "on", "one", "or", "other", "our", "out", "over", "she",
    "so", "some", "such", "than", "that", "the", "their", "them", "then", "there", "these",
    "they", "this", "those", "through", "to", "up", "us", "very", "was", "we", "were", "what",
    "when", "where", "which", "while", "who", "why", "will", "with", "would", "you", "your",
    "summary", "video", "talk",
];

const CJK_STOPWORDS: &[&str] = &[
    "我们", "你们", "他们", "她们", "这个", "那个", "这些", "那些", "就是", "然后", "因为",
    "所以", "可以", "没有", "什么", "一个", "一些", "这样", "那样", "如果", "但是", "还是",
    "已经", "非常", "自己", "大家", "今天", "视频", "内容", "总结", "摘要",
];

static LATIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9]+(?:[-+.'][A-Za-z0-9]+)*").expect("valid regex")
});
static HAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{Han}+").expect("valid regex"));

#[derive(Debug)]
struct Candidate {
    display: String,
    score: u32,
}

#[derive(Default)]
struct Scoreboard {
    entries: HashMap<String, Candidate>,
}

impl Scoreboard {
    fn add(&mut self, token: &str, weight: u32) {
        self.entries
            .entry(token.to_lowercase())
            .and_modify(|c| c.score += weight)
            .or_insert_with(|| Candidate {
                display: token.to_string(),
                score: weight,
            });
    }

    fn add_text(&mut self, text: &str, weight: u32) {
        for token in tokenize(text) {
            self.add(token, weight);
        }
    }

    fn into_ranked(self, limit: usize) -> Vec<String> {
        let mut ranked: Vec<(String, Candidate)> = self.entries.into_iter().collect();
        ranked.sort_by(|(ka, a), (kb, b)| b.score.cmp(&a.score).then_with(|| ka.cmp(kb)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(_, c)| c.display)
            .collect()
    }
}

/// Rank up to ten tags for a record.
///
/// Platform tags from `source_url` weigh 8, title tokens 5, summary tokens 1
/// per occurrence. Ties break on the lowercase tag.
pub fn score_tags(title: &str, summary: &str, source_url: Option<&str>) -> TagSet {
    let mut board = Scoreboard::default();

    if let Some(url) = source_url {
        let url = url.to_lowercase();
        let mut matched: Vec<&str> = Vec::new();
        for (domain, tag) in PLATFORM_TAGS {
            if url.contains(domain) && !matched.contains(tag) {
                matched.push(tag);
                board.add(tag, PLATFORM_WEIGHT);
            }
        }
    }

    board.add_text(title, TITLE_WEIGHT);
    board.add_text(&strip_markdown(summary), SUMMARY_WEIGHT);

    let tags = board.into_ranked(MAX_TAGS);
    debug!(count = tags.len(), "tags scored");
    TagSet(tags)
}

/// Latin words and Han runs that qualify as tag candidates, in text order
/// per script.
fn tokenize(text: &str) -> Vec<&str> {
    let latin = LATIN_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|w| is_latin_candidate(w));
    let han = HAN_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|w| is_han_candidate(w));
    latin.chain(han).collect()
}

fn is_latin_candidate(word: &str) -> bool {
    word.chars().count() >= 2
        && !word.chars().all(|c| c.is_ascii_digit())
        && !ENGLISH_STOPWORDS.contains(&word.to_lowercase().as_str())
}

fn is_han_candidate(run: &str) -> bool {
    let len = run.chars().count();
    (2..=10).contains(&len) && !CJK_STOPWORDS.contains(&run)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_outweighs_summary() {
        let tags = score_tags(
            "OpenAI launches GPT-5",
            "The model is faster. Benchmarks are strong. Benchmarks matter.",
            None,
        );
        let list = tags.as_slice();
        assert_eq!(&list[..3], ["GPT-5", "launches", "OpenAI"]);
        assert!(tags.contains("benchmarks"));
        assert!(!tags.contains("the"));
    }

    #[test]
    fn title_only_input() {
        let tags = score_tags("OpenAI launches GPT-5", "", None);
        assert_eq!(tags.as_slice(), ["GPT-5", "launches", "OpenAI"]);
    }

    #[test]
    fn platform_tag_from_source_url() {
        let tags = score_tags("Intro", "", Some("https://WWW.YouTube.com/watch?v=abc"));
        assert_eq!(tags.as_slice()[0], "YouTube");

        let tags = score_tags("Intro", "", Some("https://youtu.be/abc?list=youtube.com"));
        assert_eq!(tags.as_slice().iter().filter(|t| *t == "YouTube").count(), 1);
    }

    #[test]
    fn first_seen_casing_and_case_insensitive_merge() {
        let tags = score_tags("Rust", "rust RUST borrow", None);
        assert_eq!(tags.as_slice()[0], "Rust");
        assert!(!tags.as_slice().iter().any(|t| t == "rust" || t == "RUST"));
    }

    #[test]
    fn cjk_runs_filtered_by_length_and_stopwords() {
        let tags = score_tags("分布式系统", "我们 一致性算法 是 非常重要的一个研究方向和工程实践问题", None);
        assert!(tags.contains("分布式系统"));
        assert!(tags.contains("一致性算法"));
        assert!(!tags.contains("我们"));
        assert!(!tags.contains("是"));
        // longer than ten characters
        assert!(!tags.contains("非常重要的一个研究方向和工程实践问题"));
    }

    #[test]
    fn digits_short_words_and_markup_ignored() {
        let tags = score_tags("", "## 2024\n- **x** [Raft](https://raft.github.io) `code_span`", None);
        assert_eq!(tags.as_slice(), ["Raft"]);
    }

    #[test]
    fn at_most_ten_with_ties_broken_alphabetically() {
        let summary = "kilo juliet india hotel golf foxtrot echo delta charlie bravo alpha";
        let tags = score_tags("", summary, None);
        assert_eq!(tags.len(), 10);
        assert_eq!(tags.as_slice()[0], "alpha");
        assert!(!tags.contains("kilo"));
    }

    #[test]
    fn empty_inputs_yield_empty_set() {
        assert!(score_tags("", "", None).is_empty());
    }
}
