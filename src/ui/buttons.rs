use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
    model::id::UserId,
};

use crate::audio::queue::PageLayout;

/// Prefix of the queue navigation custom ids: `queue_page:{page}:{owner}`.
pub const QUEUE_PAGE: &str = "queue_page";

pub fn queue_page_id(page: usize, owner: UserId) -> String {
    format!("{}:{}:{}", QUEUE_PAGE, page, owner)
}

/// Parses a queue navigation id back into `(page, owner)`.
pub fn parse_queue_page_id(custom_id: &str) -> Option<(usize, UserId)> {
    let mut parts = custom_id.split(':');
    if parts.next()? != QUEUE_PAGE {
        return None;
    }
    let page = parts.next()?.parse::<usize>().ok().filter(|page| *page > 0)?;
    let owner = parts.next()?.parse::<u64>().ok().filter(|id| *id != 0)?;
    if parts.next().is_some() {
        return None;
    }
    Some((page, UserId::new(owner)))
}

/// Previous/next buttons for a queue page, or `None` when everything fits on one page.
pub fn queue_navigation(layout: &PageLayout, owner: UserId) -> Option<CreateActionRow> {
    if layout.total_pages <= 1 {
        return None;
    }

    // Ids must be unique within a message, so a disabled end button still
    // points somewhere distinct.
    let prev = CreateButton::new(queue_page_id(layout.page.saturating_sub(1).max(1), owner))
        .emoji('◀')
        .style(ButtonStyle::Primary)
        .disabled(layout.page <= 1);

    let next_page = if layout.page < layout.total_pages {
        layout.page + 1
    } else {
        layout.total_pages
    };
    let next = CreateButton::new(format!("{}:next", queue_page_id(next_page, owner)))
        .emoji('▶')
        .style(ButtonStyle::Primary)
        .disabled(layout.page >= layout.total_pages);

    Some(CreateActionRow::Buttons(vec![prev, next]))
}

/// Strips the direction marker added to the "next" button.
pub fn parse_navigation_id(custom_id: &str) -> Option<(usize, UserId)> {
    parse_queue_page_id(custom_id.strip_suffix(":next").unwrap_or(custom_id))
}
