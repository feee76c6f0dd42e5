/// A prefix command as typed by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play { query: String },
    Pause,
    Resume,
    Skip,
    Stop,
    Queue { page: usize },
    Join,
    Leave,
    Help,
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Known command, bad or missing arguments.
    Usage(&'static CommandInfo),
    Unknown(String),
}

/// Help entry for one command.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub args: &'static str,
    pub help: &'static str,
}

impl CommandInfo {
    pub fn usage(&self, prefix: &str) -> String {
        if self.args.is_empty() {
            format!("{}{}", prefix, self.name)
        } else {
            format!("{}{} {}", prefix, self.name, self.args)
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }
}

pub const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "play",
        aliases: &["p"],
        args: "<url or search>",
        help: "Plays a song or playlist, joining your voice channel if needed.",
    },
    CommandInfo {
        name: "pause",
        aliases: &[],
        args: "",
        help: "Pauses the current song.",
    },
    CommandInfo {
        name: "resume",
        aliases: &[],
        args: "",
        help: "Resumes the paused song.",
    },
    CommandInfo {
        name: "skip",
        aliases: &["s"],
        args: "",
        help: "Skips the current song. With several listeners a majority has to vote.",
    },
    CommandInfo {
        name: "stop",
        aliases: &[],
        args: "",
        help: "Stops playback, clears the queue and leaves the voice channel.",
    },
    CommandInfo {
        name: "queue",
        aliases: &["q"],
        args: "[page]",
        help: "Shows the songs in the queue.",
    },
    CommandInfo {
        name: "join",
        aliases: &[],
        args: "",
        help: "Joins your voice channel.",
    },
    CommandInfo {
        name: "leave",
        aliases: &[],
        args: "",
        help: "Leaves the voice channel and clears the queue.",
    },
    CommandInfo {
        name: "help",
        aliases: &[],
        args: "",
        help: "Displays all available commands.",
    },
    CommandInfo {
        name: "ping",
        aliases: &[],
        args: "",
        help: "Checks the bot's response time.",
    },
];

/// Parses `content` if it starts with `prefix`. Returns `None` for ordinary chat.
///
/// The prefix and command names are matched case-insensitively; the
/// arguments are kept as typed.
pub fn parse(content: &str, prefix: &str) -> Option<Result<Command, ParseError>> {
    let content = content.trim_start();
    let head = content.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }

    let rest = content[prefix.len()..].trim();
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    if name.is_empty() {
        return None;
    }
    let name = name.to_lowercase();

    let Some(info) = COMMANDS.iter().find(|info| info.matches(&name)) else {
        return Some(Err(ParseError::Unknown(name)));
    };

    let command = match info.name {
        "play" if args.is_empty() => return Some(Err(ParseError::Usage(info))),
        "play" => Command::Play {
            query: args.to_string(),
        },
        "queue" if args.is_empty() => Command::Queue { page: 1 },
        "queue" => match args.parse::<usize>() {
            Ok(page) if page > 0 => Command::Queue { page },
            _ => return Some(Err(ParseError::Usage(info))),
        },
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "skip" => Command::Skip,
        "stop" => Command::Stop,
        "join" => Command::Join,
        "leave" => Command::Leave,
        "help" => Command::Help,
        _ => Command::Ping,
    };

    Some(Ok(command))
}
