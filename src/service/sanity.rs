use std::sync::LazyLock;

use regex::Regex;

/// Maximum length of a command, in bytes
pub const MAX_COMMAND_LEN: usize = 1024;

/// Check applied to user-entered remote commands before returning them to the caller
pub trait CommandSanity: Send + Sync {
    /// Returns the reason the command is rejected, if it is
    fn check(&self, command: &str) -> Result<(), String>;
}

/// Patterns that are never allowed on a remote command, along with the reason
static DANGEROUS_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\$\(", "command substitution is not allowed"),
        (r"`", "command substitution is not allowed"),
        (r"\$\{|\$[A-Za-z_]", "variable expansion is not allowed"),
        (r"\|\||&&", "command chaining is not allowed"),
        (r";\s*rm\b", "chained removals are not allowed"),
        (r">\s*/", "redirection to absolute paths is not allowed"),
    ]
    .into_iter()
    .filter_map(|(pattern, reason)| Regex::new(pattern).ok().map(|re| (re, reason)))
    .collect()
});

/// Default [`CommandSanity`] policy
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandValidator;

impl CommandSanity for CommandValidator {
    fn check(&self, command: &str) -> Result<(), String> {
        if command.trim().is_empty() {
            return Err(String::from("the command is empty"));
        }
        if command.len() > MAX_COMMAND_LEN {
            return Err(format!("the command exceeds {MAX_COMMAND_LEN} bytes"));
        }
        if command.chars().any(char::is_control) {
            return Err(String::from("the command contains control characters"));
        }
        if !command.is_ascii() {
            return Err(String::from("the command contains non-ascii characters"));
        }
        match DANGEROUS_PATTERNS.iter().find(|(re, _)| re.is_match(command)) {
            Some((_, reason)) => Err((*reason).to_owned()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_length_boundary() {
        let validator = CommandValidator;
        assert_eq!(validator.check(&"a".repeat(MAX_COMMAND_LEN)), Ok(()));
        assert!(validator.check(&"a".repeat(MAX_COMMAND_LEN + 1)).is_err());
    }

    #[test]
    fn test_accepted_commands() {
        let validator = CommandValidator;
        for command in [
            "uptime",
            "systemctl status nginx",
            "tail -n 100 /var/log/syslog | grep error",
            "df -h; free -m",
            "echo done > out.txt",
        ] {
            assert_eq!(validator.check(command), Ok(()), "{command}");
        }
    }

    #[test]
    fn test_rejected_commands() {
        let validator = CommandValidator;
        for command in [
            "",
            "   ",
            "echo $(whoami)",
            "echo `id`",
            "echo ${HOME}",
            "cat $SECRET",
            "true || reboot",
            "cd /tmp && ls",
            "ls; rm -rf /",
            "echo x > /etc/passwd",
            "echo x >> /etc/hosts",
            "ls\n",
            "echo \u{7}",
            "echo héllo",
        ] {
            assert!(validator.check(command).is_err(), "{command:?}");
        }
    }
}
