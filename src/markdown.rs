use anyhow::anyhow;
use markdown::mdast::Node;
use markdown::{to_mdast, ParseOptions};
use textwrap::{fill, indent as prefix};

const ANSI_BOLD: &str = "\x1b[1m";
const ANSI_ITALIC: &str = "\x1b[3m";
const ANSI_RESET: &str = "\x1b[0m";

const FILL_WIDTH: usize = 80;
const INDENT_AMOUNT: usize = 4;

/// Render markdown to manpage-style HTML.
pub fn markdown_to_html(source: &str) -> anyhow::Result<String> {
    let rendered = ansi_to_html::convert_escaped(&markdown_to_ansi(source)?)
        .map_err(|e| anyhow!("failed to convert ANSI to HTML: {e:?}"))?;
    Ok(format!("<code style=\"white-space: pre\">{rendered}</code>"))
}

/// Render markdown to manpage-style ANSI-styled text.
pub fn markdown_to_ansi(source: &str) -> anyhow::Result<String> {
    let root = to_mdast(source, &ParseOptions::default())
        .map_err(|e| anyhow!("failed to parse markdown: {e:?}"))?;
    let body = Renderer::default().node(&root);
    Ok(format!("{}\n", body.trim_end()))
}

#[derive(Default)]
struct Renderer {
    /// 0-based heading level that following blocks are nested under.
    level: usize,
}

impl Renderer {
    fn nodes(&mut self, nodes: &[Node]) -> String {
        nodes.iter().map(|n| self.node(n)).collect()
    }

    /// Render inline children without letting headings inside them move the level.
    fn inline(&mut self, nodes: &[Node]) -> String {
        let level = self.level;
        let out = self.nodes(nodes);
        self.level = level;
        out
    }

    fn node(&mut self, node: &Node) -> String {
        match node {
            Node::Root(node) => self.nodes(&node.children),

            Node::Heading(node) => {
                self.level = usize::from(node.depth).saturating_sub(1);
                let inner = self.inline(&node.children);

                if self.level == 0 {
                    // top-level headings are centered and unstyled
                    let pad = FILL_WIDTH.saturating_sub(inner.chars().count()) / 2;
                    format!("{}{inner}\n\n", " ".repeat(pad.saturating_sub(1)))
                } else {
                    indent_wrap(
                        &format!("{ANSI_BOLD}{inner}{ANSI_RESET}\n"),
                        self.level.saturating_sub(1),
                    )
                }
            }

            Node::Text(node) => node.value.clone(),
            Node::Strong(node) => format!("{ANSI_BOLD}{}{ANSI_RESET}", self.inline(&node.children)),
            Node::Emphasis(node) => {
                format!("{ANSI_ITALIC}{}{ANSI_RESET}", self.inline(&node.children))
            }
            Node::InlineCode(node) => node.value.clone(),
            Node::Break(_) => "\n".to_owned(),

            Node::Link(node) => {
                let value = self.inline(&node.children);
                if value == node.url {
                    node.url.clone()
                } else {
                    format!("{value} ({})", node.url)
                }
            }

            Node::Paragraph(node) => {
                let text = self.inline(&node.children);
                format!("{}\n\n", indent_wrap(&text, self.level))
            }
            Node::Code(node) => format!("{}\n\n", indent(&node.value, self.level + 1)),

            Node::List(node) => {
                let items: String = node
                    .children
                    .iter()
                    .map(|item| {
                        let text = match item {
                            Node::ListItem(item) => self.list_item(&item.children),
                            other => self.node(other),
                        };
                        format!("{}\n", indent(&format!("- {}", text.trim()), self.level))
                    })
                    .collect();
                format!("{items}\n")
            }
            Node::ListItem(node) => self.list_item(&node.children),

            Node::ThematicBreak(_) => format!("{}\n\n", "-".repeat(FILL_WIDTH)),

            // quotes, tables etc. are flattened; leaves like raw html are dropped
            other => other
                .children()
                .map(|children| self.nodes(children))
                .unwrap_or_default(),
        }
    }

    fn list_item(&mut self, children: &[Node]) -> String {
        children
            .iter()
            .map(|child| match child {
                Node::Paragraph(p) => self.inline(&p.children),
                other => self.node(other),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn indent_wrap(text: &str, level: usize) -> String {
    indent(&fill(text, FILL_WIDTH - INDENT_AMOUNT * level.min(8)), level)
}

fn indent(text: &str, level: usize) -> String {
    prefix(text, &" ".repeat(INDENT_AMOUNT * level))
}
