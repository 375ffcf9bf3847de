//! Intent routing.
//!
//! Rules are tried in a fixed order and the first one that matches with
//! complete parameters wins:
//!
//! 1. `policy_comparison` - "compare", "difference between", "vs"; needs two
//!    distinct policy names
//! 2. `policy_summary` - "summarize", "overview", "tl;dr"; needs a policy name
//! 3. `fee_lookup` - fees, fines, tuition; optional program and semester
//! 4. `calendar_lookup` - dates, deadlines, exams; optional event and year
//! 5. `policy_search` - policies, rules; optional policy type
//! 6. `general_rag`
//!
//! Routing is a pure function of the question text.

use crate::text::{is_stop_word, tokenize};
use crate::types::{Intent, IntentKind};
use regex::Regex;
use std::sync::LazyLock;

macro_rules! pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

// Comparison
pattern!(
    RE_COMPARE,
    r"\b(compare|comparison|differences?\s+between|vs|versus)\b"
);
pattern!(
    RE_COMPARE_PAIR,
    r"\bcompare\s+(?P<a>.+?)\s+(?:and|with|to|vs\.?|versus)\s+(?P<b>.+)"
);
pattern!(
    RE_DIFFERENCE_PAIR,
    r"\bdifferences?\s+between\s+(?P<a>.+?)\s+(?:and|vs\.?|versus)\s+(?P<b>.+)"
);
pattern!(
    RE_VERSUS_PAIR,
    r"\b(?P<a>[a-z0-9]+)(?:\s+(?:polic(?:y|ies)|rules))?\s+(?:vs\.?|versus)\s+(?:the\s+)?(?P<b>[a-z0-9]+)"
);

// Summary
pattern!(RE_SUMMARY, r"\b(summari[sz]e|summary|overview|tl;?dr|brief)\b");
pattern!(
    RE_SUMMARY_OBJECT,
    r"\b(?:summari[sz]e|summary|overview|tl;?dr|brief)\b(?P<rest>.*)$"
);

// Fees
pattern!(
    RE_FEE,
    r"\b(fees?|fines?|due\s+dates?|tuition|payments?|costs?|how\s+much)\b"
);
pattern!(
    RE_PROGRAM,
    r"\b(b\.?\s?tech|m\.?\s?tech|ph\.?\s?d|mba|bba|m\.?\s?sc|b\.?\s?sc)\b"
);
pattern!(
    RE_SEMESTER_AFTER,
    r"\bsem(?:ester)?\s+(?P<n>\d{1,2}|one|two|three|four|five|six|seven|eight)\b"
);
pattern!(
    RE_SEMESTER_BEFORE,
    r"\b(?P<n>\d{1,2}(?:st|nd|rd|th)?|first|second|third|fourth|fifth|sixth|seventh|eighth)\s+sem(?:ester)?\b"
);

// Calendar
pattern!(
    RE_CALENDAR,
    r"\b(calendar|schedule|deadlines?|last\s+day|first\s+day|when\s+(?:is|does|do|are|will)|holidays?|vacation|registration|exams?|examinations?)\b"
);
pattern!(
    RE_EVENT,
    r"\b(registration|examinations?|exams?|holidays?|vacation|convocation|orientation|withdrawal|withdraw|drop|deadline)\b"
);
pattern!(RE_YEAR, r"\b(\d{4}(?:[-/]\d{2,4})?)\b");

// Policies
pattern!(RE_POLICY, r"\b(polic(?:y|ies)|regulations?|rules?)\b");
pattern!(
    RE_POLICY_TYPE,
    r"\b(academic|hostel|library|examination|admission|attendance|ragging|leave)\b"
);

/// Words that name the request rather than the policy.
const FILLER: &[&str] = &[
    "policy", "policies", "rule", "rules", "regulation", "regulations", "summarize", "summarise",
    "summary", "overview", "tl", "dr", "tldr", "brief", "briefly", "give", "quick", "short",
    "explain", "describe", "compare", "comparison", "difference", "differences", "between", "vs",
    "versus", "both",
];

const MAX_NAME_WORDS: usize = 3;

fn is_filler(token: &str) -> bool {
    is_stop_word(token) || FILLER.contains(&token)
}

/// Classifies questions into intents.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntentRouter;

impl IntentRouter {
    pub fn new() -> Self {
        Self
    }

    /// Classify `question` and extract its parameters.
    pub fn route(&self, question: &str) -> Intent {
        let normalized = normalize(question);

        let intent = comparison(&normalized)
            .or_else(|| summary(&normalized))
            .or_else(|| fee(&normalized))
            .or_else(|| calendar(&normalized))
            .or_else(|| policy_search(&normalized))
            .unwrap_or_else(Intent::general);

        tracing::debug!(intent = %intent.kind, parameters = ?intent.parameters, "Routed question");
        intent
    }
}

/// Lowercase with whitespace runs collapsed.
fn normalize(question: &str) -> String {
    question
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn matches(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|r| r.is_match(text))
}

fn first_group(re: &LazyLock<Option<Regex>>, text: &str) -> Option<String> {
    let caps = re.as_ref()?.captures(text)?;
    caps.get(1).map(|m| m.as_str().to_string())
}

fn named_group(re: &LazyLock<Option<Regex>>, text: &str, name: &str) -> Option<String> {
    let caps = re.as_ref()?.captures(text)?;
    caps.name(name).map(|m| m.as_str().to_string())
}

fn join_name(words: Vec<String>) -> Option<String> {
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// The first run of meaningful words in `text`.
fn leading_name(text: &str) -> Option<String> {
    let words = tokenize(text)
        .into_iter()
        .skip_while(|t| is_filler(t))
        .take_while(|t| !is_filler(t))
        .take(MAX_NAME_WORDS)
        .collect();
    join_name(words)
}

/// The last run of meaningful words in `text`.
fn trailing_name(text: &str) -> Option<String> {
    let mut words: Vec<String> = tokenize(text)
        .into_iter()
        .rev()
        .skip_while(|t| is_filler(t))
        .take_while(|t| !is_filler(t))
        .take(MAX_NAME_WORDS)
        .collect();
    words.reverse();
    join_name(words)
}

fn comparison(q: &str) -> Option<Intent> {
    if !matches(&RE_COMPARE, q) {
        return None;
    }

    let pair = |re: &LazyLock<Option<Regex>>| -> Option<(String, String)> {
        let caps = re.as_ref()?.captures(q)?;
        let a = leading_name(caps.name("a")?.as_str())?;
        let b = leading_name(caps.name("b")?.as_str())?;
        Some((a, b))
    };

    // A bare "x vs y" only names policies when the question says so.
    let versus = || {
        let (a, b) = pair(&RE_VERSUS_PAIR)?;
        let anchored = matches(&RE_POLICY, q)
            || (matches(&RE_POLICY_TYPE, &a) && matches(&RE_POLICY_TYPE, &b));
        anchored.then_some((a, b))
    };

    let (a, b) = pair(&RE_COMPARE_PAIR)
        .or_else(|| pair(&RE_DIFFERENCE_PAIR))
        .or_else(versus)?;

    if a == b {
        return None;
    }

    Some(
        Intent::new(IntentKind::PolicyComparison)
            .with("policy_a", a)
            .with("policy_b", b),
    )
}

fn summary(q: &str) -> Option<Intent> {
    if !matches(&RE_SUMMARY, q) {
        return None;
    }

    let before_policy_word = RE_POLICY
        .as_ref()
        .and_then(|re| re.find(q))
        .and_then(|m| trailing_name(&q[..m.start()]));

    let name = before_policy_word
        .or_else(|| named_group(&RE_SUMMARY_OBJECT, q, "rest").and_then(|rest| leading_name(&rest)))?;

    Some(Intent::new(IntentKind::PolicySummary).with("policy_name", name))
}

fn fee(q: &str) -> Option<Intent> {
    if !matches(&RE_FEE, q) {
        return None;
    }

    let mut intent = Intent::new(IntentKind::FeeLookup);
    if let Some(program) = first_group(&RE_PROGRAM, q) {
        let program: String = program.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        intent = intent.with("program", program);
    }
    if let Some(semester) = semester(q) {
        intent = intent.with("semester", semester);
    }
    Some(intent)
}

fn semester(q: &str) -> Option<String> {
    let raw = named_group(&RE_SEMESTER_AFTER, q, "n")
        .or_else(|| named_group(&RE_SEMESTER_BEFORE, q, "n"))?;

    let number = match raw.as_str() {
        "one" | "first" => "1".to_string(),
        "two" | "second" => "2".to_string(),
        "three" | "third" => "3".to_string(),
        "four" | "fourth" => "4".to_string(),
        "five" | "fifth" => "5".to_string(),
        "six" | "sixth" => "6".to_string(),
        "seven" | "seventh" => "7".to_string(),
        "eight" | "eighth" => "8".to_string(),
        digits => digits
            .trim_end_matches(|c: char| c.is_ascii_alphabetic())
            .to_string(),
    };
    Some(number)
}

fn calendar(q: &str) -> Option<Intent> {
    if !matches(&RE_CALENDAR, q) {
        return None;
    }

    let mut intent = Intent::new(IntentKind::CalendarLookup);
    if let Some(event) = first_group(&RE_EVENT, q) {
        let event = event.strip_suffix('s').unwrap_or(&event).to_string();
        intent = intent.with("event", event);
    }
    if let Some(year) = first_group(&RE_YEAR, q) {
        intent = intent.with("year", year);
    }
    Some(intent)
}

fn policy_search(q: &str) -> Option<Intent> {
    if !matches(&RE_POLICY, q) {
        return None;
    }

    let mut intent = Intent::new(IntentKind::PolicySearch);
    if let Some(policy_type) = first_group(&RE_POLICY_TYPE, q) {
        intent = intent.with("policy_type", policy_type);
    }
    Some(intent)
}
