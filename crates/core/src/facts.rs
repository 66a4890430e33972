#![forbid(unsafe_code)]


use crate::model::QaPair;
use std::collections::BTreeMap;

// Sentinel heading delimiting the confirmed-facts block inside the
// free-text ledger.
pub const LEDGER_HEADING: &str = "## Confirmed facts";

// Ledger growth is bounded: merges keep only the newest entries.
pub const MAX_LEDGER_LINES: usize = 200;

const CONFIRMED_LINE_PREFIX: &str = "Confirmado:";

// Ordered confirmed-facts ledger. Entries are `question: answer` lines;
// lookups are keyed by lower-cased trimmed question text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: Vec<QaPair>,
}

impl Ledger {
    pub fn entries(&self) -> &[QaPair] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Parses the block after the sentinel heading; text without the heading
    // is treated as a bare block of fact lines.
    pub fn parse(text: &str) -> Self {
        let body = match text.find(LEDGER_HEADING) {
            Some(start) => &text[start + LEDGER_HEADING.len()..],
            None => text,
        };

        let mut entries: Vec<QaPair> = Vec::new();
        let mut by_key: BTreeMap<String, usize> = BTreeMap::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((question, answer)) = line.split_once(':') else {
                continue;
            };
            let question = question.trim();
            let answer = answer.trim();
            if question.is_empty() || answer.is_empty() {
                continue;
            }
            let pair = QaPair::new(question, answer);
            // Later lines win: the ledger is append-oriented.
            match by_key.get(&pair.key()) {
                Some(&index) => entries[index] = pair,
                None => {
                    by_key.insert(pair.key(), entries.len());
                    entries.push(pair);
                }
            }
        }
        Self { entries }
    }

    pub fn render(&self) -> String {
        let mut out = String::from(LEDGER_HEADING);
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&format!("{}: {}\n", entry.question, entry.answer));
        }
        out
    }

    pub fn lookup(&self, question: &str) -> Option<&str> {
        let key = question.trim().to_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.key() == key)
            .map(|entry| entry.answer.as_str())
    }
}

// Re-extracts both texts, keeps the newest value per question key, and
// truncates to the newest MAX_LEDGER_LINES entries.
pub fn merge_ledger(old_text: &str, new_text: &str) -> Ledger {
    let old = Ledger::parse(old_text);
    let new = Ledger::parse(new_text);

    let mut entries = old.entries;
    let mut by_key: BTreeMap<String, usize> = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| (entry.key(), index))
        .collect();

    for entry in new.entries {
        match by_key.get(&entry.key()) {
            Some(&index) => entries[index] = entry,
            None => {
                by_key.insert(entry.key(), entries.len());
                entries.push(entry);
            }
        }
    }

    if entries.len() > MAX_LEDGER_LINES {
        entries.drain(..entries.len() - MAX_LEDGER_LINES);
    }

    Ledger { entries }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ItemPropagation {
    pub filled: usize,
    pub description_updated: bool,
}

// Back-fills unanswered clarification questions from the ledger and appends
// one confirmed-information line per filled fact to the description.
// Idempotent: the presence check makes a second run a no-op.
pub fn propagate_item(
    ledger: &Ledger,
    questions: &mut [QaPair],
    description: &mut String,
) -> ItemPropagation {
    let mut outcome = ItemPropagation::default();

    for question in questions.iter_mut() {
        if question.has_answer() {
            continue;
        }
        let Some(answer) = ledger.lookup(&question.question) else {
            continue;
        };
        question.answer = answer.to_string();
        outcome.filled += 1;

        let line = format!(
            "{CONFIRMED_LINE_PREFIX} {}: {}",
            question.question.trim(),
            answer
        );
        if !description.contains(&line) {
            if !description.is_empty() && !description.ends_with('\n') {
                description.push('\n');
            }
            description.push_str(&line);
            description.push('\n');
            outcome.description_updated = true;
        }
    }

    outcome
}
