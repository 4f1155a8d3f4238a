use std::path::PathBuf;
use thiserror::Error;

/// Console commands accepted during a live session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send a text cue to the peer.
    Send(String),
    Play(PathBuf),
    Stop,
    /// Print both latency averages.
    Averages,
    /// Retry gaze events that found no later mic activity.
    Reevaluate,
    /// Show the last N seconds.
    Window(f64),
    Scroll(f64),
    /// Print the transcript of the current window.
    Show,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("'{arg}' is not a number of seconds")]
    BadSeconds { arg: String },
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_lowercase().as_str() {
            "send" => non_empty(rest, "send").map(|t| Command::Send(t.to_string())),
            "play" => non_empty(rest, "play").map(|p| Command::Play(PathBuf::from(p))),
            "stop" => Ok(Command::Stop),
            "avg" | "averages" => Ok(Command::Averages),
            "reeval" | "reevaluate" => Ok(Command::Reevaluate),
            "window" => seconds(non_empty(rest, "window")?).map(Command::Window),
            "scroll" => seconds(non_empty(rest, "scroll")?).map(Command::Scroll),
            "show" => Ok(Command::Show),
            "quit" | "exit" => Ok(Command::Quit),
            _ => Err(CommandError::Unknown(verb.to_string())),
        }
    }

    pub fn help() -> &'static str {
        "commands: send <text> | play <wav> | stop | avg | reeval | window <secs> | scroll <secs> | show | quit"
    }
}

fn non_empty<'a>(arg: &'a str, verb: &'static str) -> Result<&'a str, CommandError> {
    if arg.is_empty() {
        Err(CommandError::MissingArgument(verb))
    } else {
        Ok(arg)
    }
}

fn seconds(arg: &str) -> Result<f64, CommandError> {
    arg.parse::<f64>()
        .ok()
        .filter(|s| s.is_finite())
        .ok_or_else(|| CommandError::BadSeconds {
            arg: arg.to_string(),
        })
}
