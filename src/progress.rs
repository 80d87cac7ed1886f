//! Tree-style progress output for album runs.
//!
//! ```text
//! AllttA - The Upper Hand
//! ├── Intro.mp3
//! │   tagged
//! └── The Woods.mp3
//!     tagged
//! ```

use std::io::Write;

const BRANCH: &str = "├── ";
const LAST_BRANCH: &str = "└── ";
const PIPE: &str = "│   ";
const SPACE: &str = "    ";
const CLEAR_LINE: &str = "\x1b[2K\r";

pub struct TreeUi<W: Write> {
    output: W,
    total: usize,
    current: usize,
    step_open: bool,
}

impl<W: Write> TreeUi<W> {
    pub fn new(output: W) -> Self {
        Self {
            output,
            total: 0,
            current: 0,
            step_open: false,
        }
    }

    fn is_last(&self) -> bool {
        self.current == self.total
    }

    fn close_step(&mut self) {
        if self.step_open {
            let _ = writeln!(self.output);
            self.step_open = false;
        }
    }

    /// Prints the album header and sets how many items follow.
    pub fn start(&mut self, header: &str, total: usize) {
        self.close_step();
        self.total = total;
        self.current = 0;
        let _ = writeln!(self.output, "{header}");
        let _ = self.output.flush();
    }

    /// Starts the next item branch.
    pub fn next(&mut self, label: &str) {
        self.close_step();
        self.current += 1;
        let prefix = if self.is_last() { LAST_BRANCH } else { BRANCH };
        let _ = writeln!(self.output, "{prefix}{label}");
        let _ = self.output.flush();
    }

    /// Replaces the current item's status line.
    pub fn step(&mut self, status: &str) {
        let indent = if self.is_last() { SPACE } else { PIPE };
        let _ = write!(self.output, "{CLEAR_LINE}{indent}{status}");
        let _ = self.output.flush();
        self.step_open = true;
    }

    pub fn done(&mut self) {
        self.close_step();
        let _ = self.output.flush();
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.output
    }
}
