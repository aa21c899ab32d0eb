//! Fixed server notices.
//!
//! Plain lines the server sends to a single session: the naming handshake,
//! the command summary and the local replies to commands.

use parley_core::Identity;

use crate::command::PRIVATE_USAGE;

pub const WELCOME: &str = "🎉 Welcome to the parley chat server!";
pub const NAME_PROMPT: &str = "📝 Please enter your username:";
pub const EMPTY_NAME: &str = "❌ Username cannot be empty. Please enter a valid username:";
pub const COMMAND_SUMMARY: &str =
    "💡 Commands: /users (list users), /private <username> <message>, /help, /quit";
pub const SEPARATOR: &str = "==========================================";
pub const NO_OTHER_USERS: &str = "📭 No other users online.";
pub const SHUTTING_DOWN: &str = "🛑 Server is shutting down. Goodbye!";

/// Lines sent in reply to `/help`.
pub const HELP: &[&str] = &[
    "📋 Available commands:",
    "  /users - Show online users",
    "  /private <username> <message> - Send private message",
    "  /quit - Leave the chat",
    "  /help - Show this help message",
];

pub fn name_taken(name: &str) -> String {
    format!("❌ Username '{name}' is already taken. Please choose another:")
}

/// First line a session receives once admitted.
pub fn admitted(identity: &Identity) -> String {
    format!("✅ Welcome, {identity}! You have joined the chat.")
}

pub fn farewell(identity: &Identity) -> String {
    format!("👋 Goodbye, {identity}!")
}

pub fn user_not_found(target: &str) -> String {
    format!("❌ User '{target}' not found or offline.")
}

pub fn usage(usage: &str) -> String {
    format!("❌ Usage: {usage}")
}

pub fn private_usage() -> String {
    usage(PRIVATE_USAGE)
}

pub fn unknown_command(token: &str) -> String {
    format!("❌ Unknown command: {token}. Type /help for available commands.")
}

pub fn line_too_long(max: usize) -> String {
    format!("❌ Line too long (max {max} bytes), message discarded.")
}

/// Reply to `/users`.
///
/// `names` is the full membership snapshot including the caller; if the
/// caller is the only one online, the "no other users" notice is sent instead.
pub fn online_users(names: &[Identity], caller: &Identity) -> String {
    if names.iter().all(|name| name == caller) {
        return NO_OTHER_USERS.to_string();
    }

    let joined = names
        .iter()
        .map(Identity::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!("👥 Online users ({}): {joined}", names.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<Identity> {
        names.iter().map(|n| Identity::parse(n).unwrap()).collect()
    }

    #[test]
    fn test_online_users_lists_everyone_with_count() {
        let names = ids(&["alice2", "bob"]);
        let caller = Identity::parse("bob").unwrap();
        assert_eq!(
            online_users(&names, &caller),
            "👥 Online users (2): alice2, bob"
        );
    }

    #[test]
    fn test_online_users_alone() {
        let caller = Identity::parse("bob").unwrap();
        assert_eq!(online_users(&ids(&["bob"]), &caller), NO_OTHER_USERS);
        assert_eq!(online_users(&[], &caller), NO_OTHER_USERS);
    }

    #[test]
    fn test_notices_name_their_subject() {
        let bob = Identity::parse("bob").unwrap();
        assert!(name_taken("alice").contains("'alice' is already taken"));
        assert!(user_not_found("zed").contains("'zed' not found"));
        assert!(unknown_command("/dance").contains("/dance"));
        assert!(farewell(&bob).contains("bob"));
        assert!(private_usage().contains(PRIVATE_USAGE));
    }
}
