// src/presenter.rs
use std::collections::HashMap;

use crate::models::server::{Category, ServerStatus};
use crate::models::snapshot::{CategoryGroup, ServerStatusSnapshot};
use crate::models::summary::{SummaryDocument, SummaryField};
use crate::utils::join_url;

pub const DEFAULT_TITLE: &str = "ABSA Official Servers";
pub const FALLBACK_CATEGORY_EMOJI: &str = "📁";
pub const ONLINE_MARKER: &str = "🟢";
pub const OFFLINE_MARKER: &str = "🔴";
pub const EMBED_COLOR: u32 = 0x2E_CC_71;

const BLANK: &str = "\u{200b}";

/// Optional imagery attached to the document. Purely cosmetic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Branding {
    pub thumbnail_url: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Presenter {
    title: String,
    category_emojis: HashMap<Category, String>,
    branding: Branding,
    update_interval_secs: u64,
    spacers: bool,
}

impl Presenter {
    pub fn new(
        title: impl Into<String>,
        category_emojis: HashMap<Category, String>,
        branding: Branding,
        update_interval_secs: u64,
    ) -> Self {
        Self {
            title: title.into(),
            category_emojis,
            branding,
            update_interval_secs,
            spacers: true,
        }
    }

    /// Drops the blank separator field emitted after each category.
    pub fn without_spacers(mut self) -> Self {
        self.spacers = false;
        self
    }

    pub fn emoji_for(&self, category: &Category) -> &str {
        self.category_emojis
            .get(category)
            .map(String::as_str)
            .unwrap_or(FALLBACK_CATEGORY_EMOJI)
    }

    pub fn render(&self, snapshot: &ServerStatusSnapshot) -> SummaryDocument {
        let mut fields = Vec::with_capacity(snapshot.server_count() + snapshot.groups.len() * 2);

        for group in &snapshot.groups {
            fields.push(self.category_header(group));
            fields.extend(group.servers.iter().map(server_field));
            if self.spacers {
                fields.push(SummaryField {
                    name: BLANK.to_string(),
                    value: BLANK.to_string(),
                    inline: false,
                });
            }
        }

        SummaryDocument {
            title: self.title.clone(),
            description: format!("👥 **Total Players:** {}", snapshot.total_players),
            color: EMBED_COLOR,
            fields,
            thumbnail_url: self.branding.thumbnail_url.clone(),
            image_url: self.branding.image_url.clone(),
            footer: Some(format!("Updates every {} seconds", self.update_interval_secs)),
        }
    }

    fn category_header(&self, group: &CategoryGroup) -> SummaryField {
        SummaryField {
            name: format!(
                "{} **{} Servers — {} players**",
                self.emoji_for(&group.category),
                group.category,
                group.total_players
            ),
            value: BLANK.to_string(),
            inline: false,
        }
    }
}

fn server_field(status: &ServerStatus) -> SummaryField {
    let marker = if status.is_online() {
        ONLINE_MARKER
    } else {
        OFFLINE_MARKER
    };

    SummaryField {
        name: format!("{} {}", marker, status.descriptor.name),
        value: format!(
            "**Map:** {}\n**Players:** {}\n[Join Server]({})",
            status.map_name,
            status.player_ratio(),
            join_url(&status.descriptor)
        ),
        inline: false,
    }
}
