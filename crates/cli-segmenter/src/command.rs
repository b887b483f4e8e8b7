use anyhow::{anyhow, bail, Result};
use segmenter::{ConfigKey, InputKind};

pub const HELP: &str = "\
Commands:
  video <path|url>      select the video input
  audio <path|url>      select the audio input
  set <key> <value>     segment 60|120|180|300, audio replace|mix,
                        sync continuous|restart, quality fast|bal|high,
                        asmr light|med|full, cleanup on|off
  toggle-cleanup        flip the cleanup flag
  go                    start processing
  cancel                stop after the clip being encoded
  reset                 drop inputs and delete the work dir
  status                show the dashboard
  wait                  block until the current job finishes
  help                  show this text
  quit                  cancel running work and exit";

/// Where an input comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Path(String),
    Url(String),
}

impl Source {
    fn parse(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") || raw.contains("://") {
            Source::Url(raw.to_string())
        } else {
            Source::Path(raw.to_string())
        }
    }
}

/// One line typed on stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Input(InputKind, Source),
    Set(ConfigKey, String),
    ToggleCleanup,
    Go,
    Cancel,
    Reset,
    Status,
    Wait,
    Help,
    Quit,
}

/// Parse a command line; blank lines and `#` comments yield `None`
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "video" | "audio" => {
            if rest.is_empty() {
                bail!("usage: {} <path|url>", word);
            }
            let kind = if word.eq_ignore_ascii_case("video") {
                InputKind::Video
            } else {
                InputKind::Audio
            };
            Command::Input(kind, Source::parse(rest))
        }
        "set" => {
            let (key, value) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("usage: set <key> <value>"))?;
            let key: ConfigKey = key.parse()?;
            Command::Set(key, value.trim().to_string())
        }
        "toggle-cleanup" | "cleanup" => Command::ToggleCleanup,
        "go" | "start" => Command::Go,
        "cancel" | "stop" => Command::Cancel,
        "reset" => Command::Reset,
        "status" => Command::Status,
        "wait" => Command::Wait,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command {:?}, type help", other),
    };
    Ok(Some(command))
}
