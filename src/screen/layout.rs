//! Header line of a screen, with the sort column highlighted.

use super::Screen;

/// Column to highlight in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderHighlight {
    Pid,
    Column(usize),
    Command,
    None,
}

/// Optional parts of every printed line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowLayout {
    pub show_timestamp: bool,
    pub show_epoch: bool,
    pub show_user: bool,
    pub show_cmdline: bool,
}

/// Width of the user column, including its trailing space.
pub(crate) const USER_WIDTH: usize = 10;

const HIGH_ON: char = '[';
const HIGH_OFF: char = ']';
const SEP: char = ' ';

impl Screen {
    /// Builds the header line. The highlighted title is wrapped in `[ ]`,
    /// the brackets taking the place of the separating spaces.
    pub fn header(&self, layout: &RowLayout, highlight: HeaderHighlight) -> String {
        let mut out = String::new();
        if layout.show_timestamp {
            out.push_str("timest ");
        }
        if layout.show_epoch {
            out.push_str("     epoch ");
        }

        let pid_on = highlight == HeaderHighlight::Pid;
        out.push(' ');
        out.push(if pid_on { HIGH_ON } else { SEP });
        out.push_str("PID");
        out.push(if pid_on { HIGH_OFF } else { SEP });
        if layout.show_user {
            out.push_str(&format!(" {:<width$}", "user", width = USER_WIDTH - 1));
        }

        let active = match highlight {
            HeaderHighlight::Column(i) => Some(i),
            _ => None,
        };
        for (i, column) in self.columns().iter().enumerate() {
            let sep = if active == Some(i) {
                HIGH_ON
            } else if i > 0 && active == Some(i - 1) {
                HIGH_OFF
            } else {
                SEP
            };
            out.push(sep);
            out.push_str(&column.header);
        }

        let last = self.columns().len().checked_sub(1);
        let command_on = highlight == HeaderHighlight::Command;
        let before = if command_on {
            HIGH_ON
        } else if last.is_some() && active == last {
            HIGH_OFF
        } else {
            SEP
        };
        out.push(before);
        out.push_str("COMMAND");
        if command_on {
            out.push(HIGH_OFF);
        }
        out
    }
}
