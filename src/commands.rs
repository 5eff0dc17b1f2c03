//! Static REPL command table and verb/alias resolution.

/// What a resolved command asks the shell to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// Connect to the machine
    Connect,
    /// Disconnect from the machine
    Disconnect,
    /// Start or resume the belt
    Start,
    /// Stop the belt
    Stop,
    /// Pause the belt
    Pause,
    /// Set the target speed
    Speed,
    /// Print the current telemetry table
    Status,
    /// Enter the live telemetry view
    Live,
    /// Print device information
    Info,
    /// Print the command listing
    Help,
    /// Leave the shell
    Quit,
}

/// A command definition: verb, aliases, and help metadata
#[derive(Debug, Clone, Copy)]
pub struct Command {
    /// Primary verb
    pub name: &'static str,
    /// Alternative verbs resolving to the same action
    pub aliases: &'static [&'static str],
    /// One-line description for the help table
    pub description: &'static str,
    /// Usage string for the help table
    pub usage: &'static str,
    /// Action the shell performs
    pub action: CommandAction,
}

/// All commands, in help-listing order
pub const COMMANDS: &[Command] = &[
    Command {
        name: "connect",
        aliases: &["c"],
        description: "Connect to the machine",
        usage: "connect",
        action: CommandAction::Connect,
    },
    Command {
        name: "disconnect",
        aliases: &["dc"],
        description: "Disconnect from the machine",
        usage: "disconnect",
        action: CommandAction::Disconnect,
    },
    Command {
        name: "start",
        aliases: &["s"],
        description: "Start or resume the belt",
        usage: "start",
        action: CommandAction::Start,
    },
    Command {
        name: "resume",
        aliases: &["r"],
        description: "Resume a paused belt",
        usage: "resume",
        action: CommandAction::Start,
    },
    Command {
        name: "stop",
        aliases: &["x"],
        description: "Stop the belt",
        usage: "stop",
        action: CommandAction::Stop,
    },
    Command {
        name: "pause",
        aliases: &["p"],
        description: "Pause the belt",
        usage: "pause",
        action: CommandAction::Pause,
    },
    Command {
        name: "speed",
        aliases: &["sp"],
        description: "Set target speed in km/h",
        usage: "speed <km/h>",
        action: CommandAction::Speed,
    },
    Command {
        name: "status",
        aliases: &["st"],
        description: "Show current telemetry",
        usage: "status",
        action: CommandAction::Status,
    },
    Command {
        name: "live",
        aliases: &["l"],
        description: "Live telemetry view (Enter exits)",
        usage: "live",
        action: CommandAction::Live,
    },
    Command {
        name: "info",
        aliases: &["i"],
        description: "Show device information",
        usage: "info",
        action: CommandAction::Info,
    },
    Command {
        name: "help",
        aliases: &["h", "?"],
        description: "Show this command listing",
        usage: "help",
        action: CommandAction::Help,
    },
    Command {
        name: "quit",
        aliases: &["q", "exit"],
        description: "Exit the shell",
        usage: "quit",
        action: CommandAction::Quit,
    },
];

/// Resolve a verb (or alias) to its command, case-insensitively
///
/// Exact matches only; the first table entry whose name or alias matches
/// wins. Unknown verbs return `None` so the caller can print the listing.
#[must_use]
pub fn resolve(verb: &str) -> Option<&'static Command> {
    let verb = verb.to_lowercase();
    COMMANDS
        .iter()
        .find(|cmd| cmd.name == verb || cmd.aliases.contains(&verb.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_alias_resolves_to_the_same_action() {
        for cmd in COMMANDS {
            let by_name = resolve(cmd.name).expect("name resolves");
            assert_eq!(by_name.action, cmd.action);
            for alias in cmd.aliases {
                let by_alias = resolve(alias).expect("alias resolves");
                assert_eq!(
                    by_alias.action, cmd.action,
                    "alias {alias} diverged from {}",
                    cmd.name
                );
            }
        }
    }

    #[test]
    fn test_resolution_is_case_insensitive() {
        assert_eq!(resolve("START").unwrap().action, CommandAction::Start);
        assert_eq!(resolve("Sp").unwrap().action, CommandAction::Speed);
        assert_eq!(resolve("QUIT").unwrap().action, CommandAction::Quit);
    }

    #[test]
    fn test_unknown_verbs_do_not_resolve() {
        assert!(resolve("warp").is_none());
        assert!(resolve("").is_none());
        assert!(resolve("star").is_none());
        assert!(resolve("stopp").is_none());
    }

    #[test]
    fn test_resume_shares_the_start_action() {
        assert_eq!(resolve("resume").unwrap().action, CommandAction::Start);
        assert_eq!(resolve("r").unwrap().action, CommandAction::Start);
    }

    #[test]
    fn test_no_duplicate_verbs_across_the_table() {
        let mut seen = std::collections::HashSet::new();
        for cmd in COMMANDS {
            assert!(seen.insert(cmd.name), "duplicate verb {}", cmd.name);
            for alias in cmd.aliases {
                assert!(seen.insert(alias), "duplicate alias {alias}");
            }
        }
    }
}
