// src/models/snapshot.rs
use crate::models::server::{Category, ServerStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroup {
    pub category: Category,
    pub servers: Vec<ServerStatus>,
    pub total_players: u32,
}

/// Per-cycle view of every endpoint, grouped by category in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStatusSnapshot {
    pub groups: Vec<CategoryGroup>,
    pub total_players: u32,
}

impl ServerStatusSnapshot {
    /// Groups `statuses` under `order`, keeping their relative order inside each
    /// category. Categories outside `order` are appended in first-seen order so
    /// no status is ever dropped.
    pub fn build(order: &[Category], statuses: Vec<ServerStatus>) -> Self {
        let mut groups: Vec<CategoryGroup> = order
            .iter()
            .map(|category| CategoryGroup {
                category: category.clone(),
                servers: Vec::new(),
                total_players: 0,
            })
            .collect();

        let mut total_players = 0u32;
        for status in statuses {
            let category = &status.descriptor.category;
            let idx = match groups.iter().position(|g| &g.category == category) {
                Some(idx) => idx,
                None => {
                    groups.push(CategoryGroup {
                        category: category.clone(),
                        servers: Vec::new(),
                        total_players: 0,
                    });
                    groups.len() - 1
                }
            };

            let counted = status.counted_players();
            let group = &mut groups[idx];
            group.total_players = group.total_players.saturating_add(counted);
            group.servers.push(status);
            total_players = total_players.saturating_add(counted);
        }

        Self {
            groups,
            total_players,
        }
    }

    pub fn group(&self, category: &Category) -> Option<&CategoryGroup> {
        self.groups.iter().find(|g| &g.category == category)
    }

    pub fn server_count(&self) -> usize {
        self.groups.iter().map(|g| g.servers.len()).sum()
    }
}
