//! Indenting line writer shared by the translators.

/// Accumulates emitted text one line at a time.
#[derive(Debug)]
pub struct CodeWriter {
    out: String,
    indent: usize,
    indent_width: usize,
    lines: u32,
}

impl CodeWriter {
    pub fn new(indent_width: usize) -> Self {
        CodeWriter {
            out: String::new(),
            indent: 0,
            indent_width,
            lines: 0,
        }
    }

    /// 1-based number of the next line to be written.
    pub fn next_line(&self) -> u32 {
        self.lines + 1
    }

    /// Writes one line at the current indentation and returns its number.
    pub fn line(&mut self, text: impl AsRef<str>) -> u32 {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.indent * self.indent_width {
                self.out.push(' ');
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
        self.lines += 1;
        self.lines
    }

    pub fn blank(&mut self) {
        self.line("");
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn finish(self) -> String {
        self.out
    }
}
