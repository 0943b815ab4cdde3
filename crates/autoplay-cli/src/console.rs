//! Line-oriented operator console for `autoplay run`.
//!
//! One command per stdin line. End of input behaves like `quit`.

use std::io::BufRead;
use std::sync::mpsc::Sender;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Pause,
    Resume,
    Stop,
    Status,
    Quit,
}

impl ConsoleCommand {
    pub const NAMES: [&'static str; 6] = ["start", "pause", "resume", "stop", "status", "quit"];

    /// Parse a trimmed, case-insensitive command word.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "stop" => Some(Self::Stop),
            "status" => Some(Self::Status),
            "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Forward parsed commands from `input` until it ends or the receiver hangs up.
pub fn pump(input: impl BufRead, commands: &Sender<ConsoleCommand>) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match ConsoleCommand::parse(&line) {
            Some(command) => {
                if commands.send(command).is_err() {
                    return;
                }
            }
            None => eprintln!(
                "unknown command: {} (expected one of: {})",
                line.trim(),
                ConsoleCommand::NAMES.join(", ")
            ),
        }
    }
    let _ = commands.send(ConsoleCommand::Quit);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc::channel;

    #[test]
    fn parses_known_commands() {
        assert_eq!(ConsoleCommand::parse(" Start "), Some(ConsoleCommand::Start));
        assert_eq!(ConsoleCommand::parse("exit"), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("jump"), None);
    }

    #[test]
    fn pump_skips_noise_and_ends_with_quit() {
        let (tx, rx) = channel();
        pump(Cursor::new("start\n\nbogus\nstatus\n"), &tx);
        let received: Vec<ConsoleCommand> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                ConsoleCommand::Start,
                ConsoleCommand::Status,
                ConsoleCommand::Quit
            ]
        );
    }
}
