use serenity::{
    all::Colour,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::{
        notifier::Notice,
        progress::{format_duration, format_optional_duration, progress_bar, NOW_PLAYING_BAR, QUEUE_BAR},
        queue::QueuePage,
        track::TrackDescriptor,
    },
    bot::commands::COMMANDS,
};

/// Bot palette.
pub mod colors {
    use serenity::all::Colour;

    /// Light pink, used by every reply.
    pub const PINK: Colour = Colour::from_rgb(255, 182, 193);
}

pub mod emoji {
    pub const PLAYING: &str = "🎶";
    pub const PAUSED: &str = "⏸️";
    pub const ADDED: &str = "✅";
    pub const SKIPPED: &str = "⏭️";
    pub const STOPPED: &str = "⏹️";
    pub const JOINED: &str = "🔊";
    pub const DISCONNECTED: &str = "🔇";
    pub const ERROR: &str = "❌";
    pub const FETCHING: &str = "🔍";
    pub const QUEUE: &str = "📜";
    pub const VOTE: &str = "🗳️";
    pub const HELP: &str = "❓";
    pub const PLAYLIST: &str = "📃";
}

/// Text content of an embed, kept apart from the builder so it can be inspected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmbedText {
    pub title: String,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub footer: Option<String>,
}

impl EmbedText {
    fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn build(self, colour: Colour) -> CreateEmbed {
        let mut embed = CreateEmbed::new()
            .title(self.title)
            .description(self.description)
            .colour(colour);
        for (name, value) in self.fields {
            embed = embed.field(name, value, false);
        }
        if let Some(footer) = self.footer {
            embed = embed.footer(CreateEmbedFooter::new(footer));
        }
        embed
    }
}

/// Renders a notice as the embed users see.
pub fn render(notice: &Notice) -> CreateEmbed {
    describe(notice).build(colors::PINK)
}

fn link(track: &TrackDescriptor) -> String {
    format!("**[{}]({})**", track.title, track.page_url)
}

fn error(title: &str, description: impl Into<String>) -> EmbedText {
    EmbedText::new(format!("{} {}", emoji::ERROR, title), description)
}

pub fn describe(notice: &Notice) -> EmbedText {
    match notice {
        Notice::Joined { channel_id } => EmbedText::new(
            format!("{} Joined Voice Channel", emoji::JOINED),
            format!("Joined voice channel: <#{}>", channel_id),
        ),
        Notice::Moved { channel_id } => EmbedText::new(
            format!("{} Moved Voice Channel", emoji::JOINED),
            format!("Moved to <#{}>", channel_id),
        ),
        Notice::AlreadyConnected { channel_id } => EmbedText::new(
            format!("{} Already Connected", emoji::JOINED),
            format!("I am already in <#{}>.", channel_id),
        ),
        Notice::ConnectionFailed { reason } => error(
            "Connection Error",
            format!("Could not connect to voice channel: `{}`", reason),
        ),
        Notice::VoiceChannelRequired => error(
            "Voice Channel Required",
            "You are not in a voice channel. Please join one first.",
        ),
        Notice::NotConnected => error("Not Connected", "I am not in a voice channel."),

        Notice::Fetching { track } => EmbedText::new(
            format!("{} Fetching Song Details...", emoji::FETCHING),
            format!("Getting details for {}...", link(track)),
        ),
        Notice::NowPlaying { track, elapsed } => now_playing(track, *elapsed),
        Notice::NowPlayingFinished { track } => EmbedText::new(
            format!("{} Now Playing (Finished)", emoji::PLAYING),
            format!(
                "{}\nDuration: `{}` (Requested by {})",
                link(track),
                format_optional_duration(track.duration),
                track.requester_mention()
            ),
        ),
        Notice::PlaybackFailed { title, reason } => error(
            "Playback Error",
            format!("Error playing **{}**: `{}`. Skipping to next song.", title, reason),
        ),

        Notice::Added { track } => EmbedText::new(
            format!("{} Added to Queue!", emoji::ADDED),
            format!("{} has been added to the queue.", link(track)),
        ),
        Notice::StartingPlayback { track } => EmbedText::new(
            format!("{} Starting Playback!", emoji::PLAYING),
            format!("{} will start playing shortly.", link(track)),
        ),
        Notice::PlaylistAdded { title, url, count } => EmbedText::new(
            format!("{} Playlist Added!", emoji::PLAYLIST),
            format!("Added **{}** songs from playlist **[{}]({})** to the queue.", count, title, url),
        ),
        Notice::ResolutionFailed { query, reason } => error(
            "Extraction Error",
            format!("Could not get anything playable from `{}`: `{}`", query, reason),
        ),

        Notice::Paused => EmbedText::new(
            format!("{} Playback Paused", emoji::PAUSED),
            "The current song has been paused.",
        ),
        Notice::Resumed => EmbedText::new(
            format!("{} Playback Resumed", emoji::PLAYING),
            "The song has been resumed.",
        ),
        Notice::AlreadyPaused => EmbedText::new(
            format!("{} Already Paused", emoji::PAUSED),
            "The song is already paused.",
        ),
        Notice::NothingPlaying => error("Nothing Playing", "No song is currently playing."),
        Notice::NothingPaused => error("Nothing Paused", "No song is currently paused to resume."),

        Notice::SkipVote { voter, votes, required } => EmbedText::new(
            format!("{} Skip Vote", emoji::VOTE),
            format!("Skip vote added by <@{}>. {}/{} votes to skip.", voter, votes, required),
        ),
        Notice::AlreadyVoted => error("Vote Already Cast", "You have already voted to skip this song."),
        Notice::Skipped { by_vote } => EmbedText::new(
            format!("{} Song Skipped!", emoji::SKIPPED),
            if *by_vote {
                "The song has been skipped by popular vote."
            } else {
                "The song has been skipped."
            },
        ),

        Notice::Stopped => EmbedText::new(
            format!("{} Playback Stopped", emoji::STOPPED),
            "The music queue has been cleared and I have left the voice channel.",
        ),
        Notice::Disconnected => EmbedText::new(
            format!("{} Disconnected", emoji::DISCONNECTED),
            "I have left the voice channel.",
        ),

        Notice::Queue(page) => queue(page),
        Notice::Help { prefix } => help(prefix),
        Notice::Pong { latency } => EmbedText::new(
            "🏓 Pong!",
            match latency {
                Some(latency) => format!("Reply latency: `{}ms`", latency.as_millis()),
                None => "Measuring...".to_string(),
            },
        ),
        Notice::Usage { usage } => error("Missing Argument", format!("Usage: `{}`", usage)),
        Notice::UnknownCommand { name, prefix } => error(
            "Unknown Command",
            format!("`{}` is not a command. Try `{}help`.", name, prefix),
        ),
        Notice::CommandFailed { reason } => error(
            "Error",
            format!("An error occurred while processing your request: `{}`", reason),
        ),
    }
}

fn now_playing(track: &TrackDescriptor, elapsed: Option<std::time::Duration>) -> EmbedText {
    let title = format!("{} Now Playing", emoji::PLAYING);
    match (elapsed, track.known_duration()) {
        (Some(elapsed), Some(total)) => EmbedText::new(
            title,
            format!(
                "{} (Requested by {})\n`{} {} {}`",
                link(track),
                track.requester_mention(),
                format_duration(elapsed.min(total)),
                progress_bar(elapsed, total, NOW_PLAYING_BAR),
                format_duration(total)
            ),
        ),
        _ => EmbedText::new(
            title,
            format!(
                "{}\nDuration: `{}` (Requested by {})",
                link(track),
                format_optional_duration(track.duration),
                track.requester_mention()
            ),
        ),
    }
}

fn queue(page: &QueuePage) -> EmbedText {
    let title = format!("{} Music Queue", emoji::QUEUE);
    if page.is_empty() {
        return EmbedText::new(title, "The queue is empty.");
    }

    let mut lines = Vec::new();
    if let (1, Some(current)) = (page.layout.page, page.current.as_ref()) {
        let line = match current.known_duration() {
            Some(total) => {
                let elapsed = page.elapsed.unwrap_or_default();
                format!(
                    "**Now Playing:** [{}]({})\n`{} {} {}` (Requested by {})",
                    current.title,
                    current.page_url,
                    format_duration(elapsed.min(total)),
                    progress_bar(elapsed, total, QUEUE_BAR),
                    format_duration(total),
                    current.requester_mention()
                )
            }
            None => format!(
                "**Now Playing:** [{}]({}) (`N/A`) (Requested by {})",
                current.title,
                current.page_url,
                current.requester_mention()
            ),
        };
        lines.push(line);
        lines.push("\n**Up Next:**".to_string());
    }

    for (index, track) in page.items.iter().enumerate() {
        lines.push(format!(
            "{}. [{}]({}) (`{}`) (Requested by {})",
            page.position(index),
            track.title,
            track.page_url,
            format_optional_duration(track.duration),
            track.requester_mention()
        ));
    }

    EmbedText::new(
        format!("{} (Page {}/{})", title, page.layout.page, page.layout.total_pages),
        lines.join("\n"),
    )
    .footer(format!(
        "{} song(s) queued • {} known total",
        page.total_items,
        format_duration(page.total_duration)
    ))
}

fn help(prefix: &str) -> EmbedText {
    let mut text = EmbedText::new(
        format!("{} Bot Commands", emoji::HELP),
        "Here are all the commands you can use:",
    );
    text.fields = COMMANDS
        .iter()
        .map(|info| {
            let mut help = info.help.to_string();
            if !info.aliases.is_empty() {
                help.push_str(&format!(" (alias: {})", info.aliases.join(", ")));
            }
            (format!("`{}`", info.usage(prefix)), help)
        })
        .collect();
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::PageLayout;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, UserId};
    use std::time::Duration;

    fn track(title: &str, secs: Option<u64>) -> TrackDescriptor {
        let mut track = TrackDescriptor::new(title, format!("https://y.tube/{title}"), UserId::new(42), ChannelId::new(1));
        track.duration = secs.map(Duration::from_secs);
        track
    }

    #[test]
    fn now_playing_shows_progress_when_duration_known() {
        let text = describe(&Notice::NowPlaying {
            track: track("Song", Some(200)),
            elapsed: Some(Duration::from_secs(100)),
        });
        assert_eq!(
            text.description,
            "**[Song](https://y.tube/Song)** (Requested by <@42>)\n`01:40 ██████████────────── 03:20`"
        );
    }

    #[test]
    fn now_playing_without_duration_shows_na() {
        let text = describe(&Notice::NowPlaying {
            track: track("Live", None),
            elapsed: None,
        });
        assert!(text.description.contains("Duration: `N/A`"));
    }

    #[test]
    fn queue_first_page_lists_current_and_upcoming() {
        let page = QueuePage {
            current: Some(track("Now", Some(100))),
            elapsed: Some(Duration::from_secs(50)),
            items: vec![track("Next", Some(65)), track("Later", None)],
            layout: PageLayout::compute(2, true, 1),
            total_items: 2,
            total_duration: Duration::from_secs(65),
        };
        let text = describe(&Notice::Queue(page));

        assert!(text.title.ends_with("Music Queue (Page 1/1)"));
        let lines: Vec<&str> = text.description.lines().collect();
        assert_eq!(lines[1], "`00:50 █████───── 01:40` (Requested by <@42>)");
        assert_eq!(lines[4], "1. [Next](https://y.tube/Next) (`01:05`) (Requested by <@42>)");
        assert_eq!(lines[5], "2. [Later](https://y.tube/Later) (`N/A`) (Requested by <@42>)");
    }

    #[test]
    fn empty_queue() {
        let page = QueuePage {
            current: None,
            elapsed: None,
            items: Vec::new(),
            layout: PageLayout::compute(0, false, 1),
            total_items: 0,
            total_duration: Duration::ZERO,
        };
        assert_eq!(describe(&Notice::Queue(page)).description, "The queue is empty.");
    }

    #[test]
    fn help_lists_every_command() {
        let text = describe(&Notice::Help { prefix: "zix ".into() });
        assert_eq!(text.fields.len(), COMMANDS.len());
        assert_eq!(text.fields[0].0, "`zix play <url or search>`");
    }
}
