/// Which side of the conversation a line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Spoken by the user (server transcript)
    Sent,
    /// Produced by the agent
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub text: String,
    pub direction: Direction,
}

/// Destination for transcript and response text
pub trait DisplaySink {
    fn display(&mut self, text: &str, direction: Direction);

    /// Forget everything shown so far
    fn clear(&mut self) {}
}

/// In-memory chat log, optionally echoed to the terminal
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: Vec<ChatEntry>,
    echo: bool,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that also prints every line as it arrives
    pub fn console() -> Self {
        ChatLog {
            entries: Vec::new(),
            echo: true,
        }
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }
}

impl DisplaySink for ChatLog {
    fn display(&mut self, text: &str, direction: Direction) {
        if self.echo {
            match direction {
                Direction::Sent => println!("🗣️  you: \"{}\"", text),
                Direction::Received => println!("🤖 agent: \"{}\"", text),
            }
        }
        self.entries.push(ChatEntry {
            text: text.to_string(),
            direction,
        });
    }

    fn clear(&mut self) {
        self.entries.clear();
        if self.echo {
            println!("🧹 Chat cleared");
        }
    }
}
