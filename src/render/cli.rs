//! CLI text rendering for the branch forest.
//!
//! ```text
//! branch_no_upstream
//! master
//!     ├─ test_branch
//!     │   ├─ fun_branch
//!     │   └─ test_two
//!     └─ test_zoo
//! ```

use std::io::{self, Write};

use colored::{ColoredString, Colorize};

use super::colors::{ThemeColor, theme};
use crate::tree::{Forest, Node};

const BRANCH: &str = "├─ ";
const LAST_BRANCH: &str = "└─ ";
const CONTINUE: &str = "│   ";
const BLANK: &str = "    ";

/// Marker appended to branches that could not be placed in the tree.
pub const UNPLACED_MARKER: &str = "[ancestry unavailable]";

/// Length of the abbreviated tip id shown with `--tips`.
const SHORT_TIP: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Emit ANSI colors.
    pub color: bool,
    /// Append each branch's abbreviated tip commit.
    pub show_tips: bool,
}

fn apply_color(s: &str, color: ThemeColor) -> ColoredString {
    let (r, g, b) = color.rgb();
    s.truecolor(r, g, b)
}

#[derive(Debug, Clone, Copy)]
enum Position {
    Root,
    Child { last: bool },
}

struct Frame<'a> {
    node: &'a Node,
    prefix: String,
    position: Position,
}

/// Lines of the rendered forest, produced one at a time.
pub struct TreeLines<'a> {
    forest: &'a Forest,
    options: RenderOptions,
    stack: Vec<Frame<'a>>,
}

impl<'a> TreeLines<'a> {
    fn new(forest: &'a Forest, options: RenderOptions) -> Self {
        let roots: Vec<&Node> = forest.roots().collect();
        let stack = roots
            .into_iter()
            .rev()
            .map(|node| Frame {
                node,
                prefix: String::new(),
                position: Position::Root,
            })
            .collect();
        Self {
            forest,
            options,
            stack,
        }
    }

    fn label(&self, node: &Node) -> String {
        let name = &node.branch.name;
        let mut label = if self.options.color && self.forest.is_current(name) {
            apply_color(name, theme::GREEN).bold().to_string()
        } else {
            name.clone()
        };

        if self.options.show_tips {
            let tip = node
                .branch
                .tip
                .map(|tip| tip.to_string()[..SHORT_TIP].to_string())
                .unwrap_or_else(|| "?".repeat(SHORT_TIP));
            let tip = format!("({tip})");
            label.push(' ');
            if self.options.color {
                label.push_str(&apply_color(&tip, theme::GOLD).to_string());
            } else {
                label.push_str(&tip);
            }
        }

        if node.error.is_some() {
            label.push(' ');
            if self.options.color {
                label.push_str(&apply_color(UNPLACED_MARKER, theme::RED).to_string());
            } else {
                label.push_str(UNPLACED_MARKER);
            }
        }
        label
    }

    fn connector(&self, prefix: &str, last: bool) -> String {
        let connector = format!("{prefix}{}", if last { LAST_BRANCH } else { BRANCH });
        if self.options.color {
            apply_color(&connector, theme::TREE).to_string()
        } else {
            connector
        }
    }
}

impl Iterator for TreeLines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let Frame {
            node,
            prefix,
            position,
        } = self.stack.pop()?;

        let label = self.label(node);
        let (line, child_prefix) = match position {
            Position::Root => (label, BLANK.to_string()),
            Position::Child { last } => {
                let line = format!("{}{label}", self.connector(&prefix, last));
                let child_prefix = format!("{prefix}{}", if last { BLANK } else { CONTINUE });
                (line, child_prefix)
            }
        };

        let children: Vec<&Node> = self.forest.children(node).collect();
        let count = children.len();
        for (i, child) in children.into_iter().enumerate().rev() {
            self.stack.push(Frame {
                node: child,
                prefix: child_prefix.clone(),
                position: Position::Child {
                    last: i + 1 == count,
                },
            });
        }
        Some(line)
    }
}

/// Render the forest lazily, one line per branch.
pub fn render(forest: &Forest, options: RenderOptions) -> TreeLines<'_> {
    TreeLines::new(forest, options)
}

/// Write the rendered forest to stdout.
pub fn render_cli(forest: &Forest, options: RenderOptions) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in render(forest, options) {
        writeln!(out, "{line}")?;
    }
    out.flush()
}
