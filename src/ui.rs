/// Transcript text shared between the TUI and plain-stdout modes.

// ── Turn labels ───────────────────────────────────────────────────────────────

pub const USER_LABEL: &str = "You";
pub const ASSISTANT_LABEL: &str = "GPT";

fn label(name: &str, timestamps: bool) -> String {
    if timestamps {
        let now = chrono::Local::now().format("%H:%M");
        format!("{name} ({now}) ->\n")
    } else {
        format!("{name} ->\n")
    }
}

/// The block appended to the transcript when a question is sent:
/// the user's question followed by the assistant label the reply streams under.
pub fn question_block(question: &str, timestamps: bool) -> String {
    format!(
        "{}{question}\n\n{}",
        label(USER_LABEL, timestamps),
        label(ASSISTANT_LABEL, timestamps)
    )
}

/// Paragraph break closing a finished reply.
pub const REPLY_END: &str = "\n\n";

pub fn failure_block(error: &str) -> String {
    format!("\n\n> **error:** {error}\n\n")
}

pub const CANCELLED_BLOCK: &str = "\n\n*(cancelled)*\n\n";
