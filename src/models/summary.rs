// src/models/summary.rs
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Render-ready status document, independent of any chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryDocument {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<SummaryField>,
    pub thumbnail_url: Option<String>,
    pub image_url: Option<String>,
    pub footer: Option<String>,
}
