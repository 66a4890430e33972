#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};
use tm_core::model::Chunk;

const CHUNK_ID_PREFIX: &str = "c:";
const CHUNK_ID_HEX_LEN: usize = 16;

// A titled document fragment as handed over by the text-extraction layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkInput {
    pub title: String,
    pub content: String,
}

impl ChunkInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

// Content-addressed identity: unchanged sections keep a stable id across
// document versions, which is what makes diff traceability work.
pub fn chunk_id(title: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    format!("{CHUNK_ID_PREFIX}{}", &hex[..CHUNK_ID_HEX_LEN])
}

pub fn build_chunks(inputs: &[ChunkInput]) -> Vec<Chunk> {
    inputs
        .iter()
        .map(|input| Chunk {
            id: chunk_id(&input.title, &input.content),
            title: input.title.clone(),
            content: input.content.clone(),
        })
        .collect()
}
