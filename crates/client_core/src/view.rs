//! Presentational shell: pure derivations from a controller snapshot.
//! Nothing here holds state of its own.

use serde::Serialize;
use shared::{domain::TagId, protocol::RecipeSummary};

use crate::ListSnapshot;

pub const HOME_TITLE: &str = "Recipes";

/// Fixed number of recipe cards per page.
pub const PAGE_SIZE: u64 = 6;

pub fn page_count(total_count: u64) -> u64 {
    total_count.div_ceil(PAGE_SIZE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCheckbox {
    pub tag_id: TagId,
    pub name: String,
    pub checked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationView {
    pub page: u32,
    pub page_count: u64,
    pub has_previous: bool,
    pub has_next: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomeView {
    pub title: &'static str,
    pub tag_checkboxes: Vec<TagCheckbox>,
    pub cards: Vec<RecipeSummary>,
    pub pagination: PaginationView,
}

/// Clamps navigation affordances; does not clamp the page itself. A page
/// beyond the last one simply renders with both affordances pointing back.
pub fn pagination_view(page: u32, total_count: u64) -> PaginationView {
    let page_count = page_count(total_count);
    PaginationView {
        page,
        page_count,
        has_previous: page > 1,
        has_next: u64::from(page) < page_count,
    }
}

pub fn home_view(snapshot: &ListSnapshot) -> HomeView {
    HomeView {
        title: HOME_TITLE,
        tag_checkboxes: snapshot
            .tags
            .iter()
            .map(|entry| TagCheckbox {
                tag_id: entry.tag.id,
                name: entry.tag.name.clone(),
                checked: entry.active,
            })
            .collect(),
        cards: snapshot.recipes.clone(),
        pagination: pagination_view(snapshot.current_page, snapshot.total_count),
    }
}
