//! # UI
//!
//! Discord presentation: [`embeds`] turns [`Notice`](crate::audio::notifier::Notice)s
//! into embeds, [`buttons`] builds the queue page navigation.

pub mod buttons;
pub mod embeds;
