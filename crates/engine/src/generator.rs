#![forbid(unsafe_code)]

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tm_core::model::{Chunk, DraftItem, ItemType, Priority, QaPair};

const TASK_TITLE_MAX_CHARS: usize = 80;

// Serializable so process-based generators can receive it verbatim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratorRequest {
    pub system_instruction: String,
    pub user_prompt: String,
}

#[derive(Debug)]
pub enum GeneratorError {
    Unavailable(String),
    Timeout,
    Malformed(String),
}

impl std::fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(detail) => write!(f, "generator unavailable: {detail}"),
            Self::Timeout => write!(f, "generator timed out"),
            Self::Malformed(detail) => write!(f, "generator output malformed: {detail}"),
        }
    }
}

impl std::error::Error for GeneratorError {}

// External content generator contract. Implementations may fail or time
// out; callers must treat every failure as "generator absent" and fall back
// to the deterministic heuristic, never surface it as fatal.
pub trait Generator {
    fn generate(&self, request: &GeneratorRequest) -> Result<Value, GeneratorError>;
}

pub fn build_generation_prompt(chunks: &[Chunk]) -> GeneratorRequest {
    let mut user_prompt = String::new();
    for chunk in chunks {
        user_prompt.push_str(&format!(
            "[chunk {}] {}\n{}\n\n",
            chunk.id, chunk.title, chunk.content
        ));
    }
    GeneratorRequest {
        system_instruction: concat!(
            "Propose backlog items for the requirement sections below. ",
            "Respond with JSON: {\"items\": [{\"type\": \"epic|story|task\", ",
            "\"title\": \"...\", \"description\": \"...\", \"area\": \"...\", ",
            "\"priority\": \"High|Medium|Low\", \"acceptanceCriteria\": [], ",
            "\"dependencies\": [], \"risks\": [], \"labels\": [], ",
            "\"questions\": [{\"question\": \"...\", \"answer\": \"\"}], ",
            "\"parent\": \"externalId or empty\", \"sourceChunkId\": \"...\"}]}"
        )
        .to_string(),
        user_prompt,
    }
}

// Resolves a proposal for the given chunks: the external generator when it
// is configured and answers with usable items, the local heuristic in every
// other case. Total; generator trouble never escapes this boundary.
pub fn resolve_proposal(generator: Option<&dyn Generator>, chunks: &[Chunk]) -> Vec<DraftItem> {
    let Some(generator) = generator else {
        return heuristic_items(chunks);
    };
    let request = build_generation_prompt(chunks);
    match generator.generate(&request) {
        Ok(value) => {
            let items = coerce_items_payload(&value);
            if items.is_empty() {
                heuristic_items(chunks)
            } else {
                items
            }
        }
        Err(_) => heuristic_items(chunks),
    }
}

// Ingestion-boundary coercion: heterogeneous, untyped generator output is
// validated into tagged drafts with defaults applied before any merge or
// normalize logic inspects it. Malformed entries are skipped, not fatal.
pub fn coerce_items_payload(value: &Value) -> Vec<DraftItem> {
    let entries = match value {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(map) => match map.get("items") {
            Some(Value::Array(entries)) => entries.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    entries.iter().filter_map(coerce_item).collect()
}

fn coerce_item(value: &Value) -> Option<DraftItem> {
    let map = value.as_object()?;
    let title = map
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())?
        .to_string();

    let item_type = map
        .get("type")
        .or_else(|| map.get("itemType"))
        .and_then(Value::as_str)
        .and_then(ItemType::parse)
        .unwrap_or(ItemType::Task);

    let mut item = DraftItem::new(item_type, title);
    item.external_id = string_field(map, &["externalId", "external_id"]);
    item.parent_external_id = string_field(map, &["parent", "parentId", "parent_external_id"]);
    item.description = string_field(map, &["description"]).unwrap_or_default();
    item.area = first_scalar(map.get("area")).unwrap_or_default();
    item.priority = map
        .get("priority")
        .and_then(Value::as_str)
        .and_then(Priority::parse)
        .unwrap_or(Priority::Medium);
    item.acceptance_criteria =
        string_list(map.get("acceptanceCriteria").or_else(|| map.get("acceptance_criteria")));
    item.dependencies = string_list(map.get("dependencies"));
    item.risks = string_list(map.get("risks"));
    item.labels = string_list(map.get("labels"));
    item.questions = qa_list(map.get("questions").or_else(|| map.get("clarificationQuestions")));
    item.source_chunk_id = string_field(map, &["sourceChunkId", "source_chunk_id", "chunk"]);
    item.source_snippet = string_field(map, &["sourceSnippet", "source_snippet"]);
    Some(item)
}

fn string_field(
    map: &serde_json::Map<String, Value>,
    keys: &[&str],
) -> Option<String> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

// Area may arrive as a scalar or a list; only the first value counts.
fn first_scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.trim().to_string()).filter(|t| !t.is_empty()),
        Value::Array(entries) => entries
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(text)) if !text.trim().is_empty() => vec![text.trim().to_string()],
        _ => Vec::new(),
    }
}

fn qa_list(value: Option<&Value>) -> Vec<QaPair> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(question) if !question.trim().is_empty() => {
                Some(QaPair::unanswered(question.trim()))
            }
            Value::Object(map) => {
                let question = map
                    .get("question")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|q| !q.is_empty())?;
                let answer = map
                    .get("answer")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .unwrap_or_default();
                Some(QaPair::new(question, answer))
            }
            _ => None,
        })
        .collect()
}

// Deterministic local generation: one epic and one story per chunk, one
// task per bullet line. Parents stay unset; the normalizer wires the chain
// through the shared source chunk.
pub fn heuristic_items(chunks: &[Chunk]) -> Vec<DraftItem> {
    let mut out = Vec::new();
    for chunk in chunks {
        let title = if chunk.title.trim().is_empty() {
            first_line(&chunk.content)
        } else {
            chunk.title.trim().to_string()
        };

        let mut epic = DraftItem::new(ItemType::Epic, title.clone());
        epic.description = chunk.content.clone();
        epic.source_chunk_id = Some(chunk.id.clone());
        out.push(epic);

        let mut story = DraftItem::new(ItemType::Story, title);
        story.description = chunk.content.clone();
        story.source_chunk_id = Some(chunk.id.clone());
        out.push(story);

        for bullet in bullet_lines(&chunk.content) {
            let mut task = DraftItem::new(
                ItemType::Task,
                bullet.chars().take(TASK_TITLE_MAX_CHARS).collect::<String>(),
            );
            task.description = bullet;
            task.source_chunk_id = Some(chunk.id.clone());
            out.push(task);
        }
    }
    out
}

fn first_line(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("Untitled")
        .to_string()
}

fn bullet_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| {
                    line.split_once(". ").and_then(|(head, rest)| {
                        if head.chars().all(|c| c.is_ascii_digit()) && !head.is_empty() {
                            Some(rest)
                        } else {
                            None
                        }
                    })
                })
        })
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
