//! The structured answer model the client renders: typed sections plus
//! answer-level metadata.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    #[default]
    Text,
    Checklist,
    Warning,
}

/// Section content is either a paragraph or a list of items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionContent {
    Text(String),
    Items(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSection {
    pub title: String,
    pub content: SectionContent,
    /// Abstract icon name, not a UI asset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub expandable: bool,
    #[serde(rename = "type", default)]
    pub kind: SectionKind,
}

impl AnswerSection {
    pub fn text(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: SectionContent::Text(content.into()),
            icon: None,
            priority: Priority::Medium,
            expandable: false,
            kind: SectionKind::Text,
        }
    }

    pub fn checklist(title: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            title: title.into(),
            content: SectionContent::Items(items),
            icon: None,
            priority: Priority::Medium,
            expandable: false,
            kind: SectionKind::Checklist,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    pub intent_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub sections: Vec<AnswerSection>,
    pub metadata: AnswerMetadata,
}
