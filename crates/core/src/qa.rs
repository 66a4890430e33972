#![forbid(unsafe_code)]


use crate::model::QaPair;
use std::collections::BTreeMap;

// Accepts both structured pairs and the semi-structured flat text some
// storage schemas keep: "Q:"/"A:" line pairs, or "question?: answer" lines,
// optionally bulleted. Entries with an empty question are discarded.
pub fn parse_qa_text(text: &str) -> Vec<QaPair> {
    let mut out: Vec<QaPair> = Vec::new();

    for raw_line in text.lines() {
        let line = strip_bullet(raw_line.trim());
        if line.is_empty() {
            continue;
        }

        if let Some(question) = strip_tag(line, "Q:") {
            if !question.is_empty() {
                out.push(QaPair::unanswered(question));
            }
            continue;
        }
        if let Some(answer) = strip_tag(line, "A:") {
            if let Some(last) = out.last_mut()
                && !last.has_answer()
            {
                last.answer = answer.to_string();
            }
            continue;
        }

        match line.split_once(':') {
            Some((question, answer)) => {
                let question = question.trim();
                if !question.is_empty() {
                    out.push(QaPair::new(question, answer.trim()));
                }
            }
            None => out.push(QaPair::unanswered(line)),
        }
    }

    dedup_pairs(out)
}

// Within one input, the same question key keeps the longer question text
// and the first non-empty answer.
pub fn dedup_pairs(pairs: Vec<QaPair>) -> Vec<QaPair> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: BTreeMap<String, QaPair> = BTreeMap::new();

    for pair in pairs {
        let question = pair.question.trim();
        if question.is_empty() {
            continue;
        }
        let key = pair.key();
        match by_key.get_mut(&key) {
            None => {
                order.push(key.clone());
                by_key.insert(
                    key,
                    QaPair::new(question, pair.answer.trim()),
                );
            }
            Some(kept) => {
                if question.len() > kept.question.len() {
                    kept.question = question.to_string();
                }
                if !kept.has_answer() && !pair.answer.trim().is_empty() {
                    kept.answer = pair.answer.trim().to_string();
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect()
}

// Idempotent keyed merge: existing keys first in their original order, new
// keys appended. A non-empty existing answer is never replaced.
pub fn merge_qa(existing: &[QaPair], incoming: &[QaPair]) -> Vec<QaPair> {
    let existing = dedup_pairs(existing.to_vec());
    let incoming = dedup_pairs(incoming.to_vec());

    let mut incoming_by_key: BTreeMap<String, QaPair> = BTreeMap::new();
    let mut incoming_order: Vec<String> = Vec::new();
    for pair in incoming {
        incoming_order.push(pair.key());
        incoming_by_key.insert(pair.key(), pair);
    }

    let mut out: Vec<QaPair> = Vec::new();
    let mut seen: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();

    for pair in existing {
        let key = pair.key();
        seen.insert(key.clone());
        let merged = match incoming_by_key.remove(&key) {
            None => pair,
            Some(other) => merge_pair(pair, other),
        };
        out.push(merged);
    }

    for key in incoming_order {
        if seen.contains(&key) {
            continue;
        }
        if let Some(pair) = incoming_by_key.remove(&key) {
            out.push(pair);
        }
    }

    out
}

fn merge_pair(existing: QaPair, incoming: QaPair) -> QaPair {
    let question = if incoming.question.trim().len() > existing.question.trim().len() {
        incoming.question.trim().to_string()
    } else {
        existing.question.trim().to_string()
    };
    // A confirmed answer is never silently discarded: existing wins when
    // both sides carry different non-empty answers.
    let answer = if existing.has_answer() {
        existing.answer
    } else {
        incoming.answer
    };
    QaPair { question, answer }
}

fn strip_bullet(line: &str) -> &str {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line)
        .trim()
}

fn strip_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(tag)?;
    Some(rest.trim())
}
