#![forbid(unsafe_code)]

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemType {
    Epic,
    Story,
    Task,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Epic => "epic",
            ItemType::Story => "story",
            ItemType::Task => "task",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "epic" => Some(ItemType::Epic),
            "story" => Some(ItemType::Story),
            "task" => Some(ItemType::Task),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" | "normal" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    pub fn max(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    Todo,
    InProgress,
    Review,
    Done,
    Obsolete,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Todo => "todo",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Review => "review",
            ItemStatus::Done => "done",
            ItemStatus::Obsolete => "obsolete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "todo" => Some(ItemStatus::Todo),
            "in_progress" => Some(ItemStatus::InProgress),
            "review" => Some(ItemStatus::Review),
            "done" => Some(ItemStatus::Done),
            "obsolete" => Some(ItemStatus::Obsolete),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    pub fn unanswered(question: impl Into<String>) -> Self {
        Self::new(question, "")
    }

    // Identity key: lower-cased, trimmed question text.
    pub fn key(&self) -> String {
        self.question.trim().to_lowercase()
    }

    pub fn has_answer(&self) -> bool {
        !self.answer.trim().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub title: String,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        }
    }
}

// One grouped difference between two chunk sequences. A group can span
// several adjacent chunks, so the originating ids are kept as lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub old_chunk_ids: Vec<String>,
    pub new_chunk_ids: Vec<String>,
    pub summary: String,
}

// Candidate work item flowing through normalize -> dedup -> titles -> apply.
// Untrusted until normalized: parents may dangle, ids may be missing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DraftItem {
    pub external_id: Option<String>,
    pub item_type: ItemType,
    pub parent_external_id: Option<String>,
    pub title: String,
    pub description: String,
    pub area: String,
    pub priority: Priority,
    pub acceptance_criteria: Vec<String>,
    pub dependencies: Vec<String>,
    pub risks: Vec<String>,
    pub labels: Vec<String>,
    pub questions: Vec<QaPair>,
    pub source_chunk_id: Option<String>,
    pub source_snippet: Option<String>,
}

impl DraftItem {
    pub fn new(item_type: ItemType, title: impl Into<String>) -> Self {
        Self {
            external_id: None,
            item_type,
            parent_external_id: None,
            title: title.into(),
            description: String::new(),
            area: String::new(),
            priority: Priority::Medium,
            acceptance_criteria: Vec::new(),
            dependencies: Vec::new(),
            risks: Vec::new(),
            labels: Vec::new(),
            questions: Vec::new(),
            source_chunk_id: None,
            source_snippet: None,
        }
    }
}

// Read-only view of a persisted item, as much as the pure stages need.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub external_id: String,
    pub item_type: ItemType,
    pub parent_external_id: Option<String>,
    pub title: String,
    pub status: ItemStatus,
    pub source_chunk_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub external_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub area: Option<String>,
    pub priority: Option<Priority>,
    pub source_chunk_id: Option<String>,
}

impl ItemPatch {
    pub fn for_item(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientQuestion {
    pub question: String,
    pub priority: Priority,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionBundle {
    pub creates: Vec<DraftItem>,
    pub updates: Vec<ItemPatch>,
    pub obsoletes: Vec<String>,
    pub questions: Vec<ClientQuestion>,
}

impl ActionBundle {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty()
            && self.updates.is_empty()
            && self.obsoletes.is_empty()
            && self.questions.is_empty()
    }
}
