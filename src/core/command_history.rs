use crate::core::buffer::BoundedBuffer;

/// Previously sent commands with shell-style up/down navigation
#[derive(Debug, Clone)]
pub struct CommandHistory {
    commands: BoundedBuffer<String>,
    /// Index into `commands` while browsing, `None` otherwise
    cursor: Option<usize>,
}

impl CommandHistory {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        Self {
            commands: BoundedBuffer::new(capacity),
            cursor: None,
        }
    }

    /// Record a command. Blank input and repeats of the newest entry are
    /// ignored. Any navigation in progress is reset.
    pub fn push(&mut self, command: &str) -> bool {
        self.cursor = None;

        if command.trim().is_empty() {
            return false;
        }
        if self.commands.back().map(String::as_str) == Some(command) {
            return false;
        }

        self.commands.push(command.to_string());
        true
    }

    /// Step toward older entries. Stays on the oldest entry once reached.
    pub fn navigate_previous(&mut self) -> Option<String> {
        if self.commands.is_empty() {
            return None;
        }

        let index = match self.cursor {
            None => self.commands.len() - 1,
            Some(index) => index.saturating_sub(1),
        };
        self.cursor = Some(index);
        self.commands.get(index).cloned()
    }

    /// Step toward newer entries. Moving past the newest entry leaves
    /// browsing mode and yields an empty string so the caller can restore
    /// its draft. Returns `None` when not browsing.
    pub fn navigate_next(&mut self) -> Option<String> {
        let index = self.cursor?;

        if index + 1 < self.commands.len() {
            self.cursor = Some(index + 1);
            self.commands.get(index + 1).cloned()
        } else {
            self.cursor = None;
            Some(String::new())
        }
    }

    pub fn reset_navigation(&mut self) {
        self.cursor = None;
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Case-insensitive substring search, oldest first
    pub fn search(&self, query: &str) -> Vec<String> {
        let query = query.to_lowercase();
        self.commands
            .iter()
            .filter(|command| command.to_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    pub fn entries(&self) -> Vec<String> {
        self.commands.to_vec()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.cursor = None;
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.commands.capacity()
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
