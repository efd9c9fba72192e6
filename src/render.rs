//! Editorial layout for a finished analysis.
//!
//! Both renderers walk the same section list so the Telegram and terminal
//! output never drift apart.

use crate::analysis::{AnalysisResult, UserInput};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Paragraph(String),
    Emphasis(String),
    Tags(Vec<String>),
    Numbered(Vec<String>),
    Titled(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    label: &'static str,
    blocks: Vec<Block>,
}

fn section(label: &'static str, blocks: Vec<Block>) -> Section {
    Section { label, blocks }
}

fn input_section(input: &UserInput, result: &AnalysisResult) -> Option<Section> {
    let mut blocks = Vec::new();
    let text = input.text.trim();
    if !text.is_empty() {
        blocks.push(Block::Emphasis(text.to_string()));
    }
    if let Some(translation) = result.input_translation.as_deref() {
        blocks.push(Block::Paragraph(format!("译文：{}", translation.trim())));
    }
    if input.image.is_some() {
        blocks.push(Block::Paragraph("［附图］".to_string()));
    }
    let link = input.video_link.trim();
    if !link.is_empty() {
        blocks.push(Block::Paragraph(format!("视频：{link}")));
    }
    (!blocks.is_empty()).then(|| section("原始输入", blocks))
}

fn layout(result: &AnalysisResult, input: &UserInput) -> (String, String, Vec<Section>) {
    let mut sections = Vec::new();
    sections.extend(input_section(input, result));
    sections.push(section(
        "核心概念",
        vec![
            Block::Emphasis(result.core_concept.principle.clone()),
            Block::Paragraph(result.core_concept.explanation.clone()),
        ],
    ));
    sections.push(section(
        "情绪氛围",
        vec![
            Block::Tags(result.emotional_atmosphere.keywords.clone()),
            Block::Paragraph(result.emotional_atmosphere.description.clone()),
        ],
    ));
    sections.push(section(
        "结构解析",
        vec![Block::Numbered(result.structural_analysis.clone())],
    ));
    sections.push(section(
        "隐喻",
        vec![Block::Emphasis(result.metaphor.clone())],
    ));
    sections.push(section(
        "叙事弧线",
        vec![Block::Paragraph(result.narrative_arc.clone())],
    ));
    sections.push(section(
        "延展场景",
        vec![Block::Titled(
            result
                .scenarios
                .iter()
                .map(|scenario| (scenario.title.clone(), scenario.description.clone()))
                .collect(),
        )],
    ));
    sections.push(section(
        "反向视角",
        vec![Block::Paragraph(result.counter_perspective.clone())],
    ));
    sections.push(section(
        "视觉建议",
        vec![Block::Numbered(result.visual_suggestions.clone())],
    ));
    (result.headline.clone(), result.subheadline.clone(), sections)
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn block_html(block: &Block) -> String {
    match block {
        Block::Paragraph(text) => escape_html(text.trim()),
        Block::Emphasis(text) => format!("<i>{}</i>", escape_html(text.trim())),
        Block::Tags(tags) => tags
            .iter()
            .map(|tag| format!("#{}", escape_html(tag.trim())))
            .collect::<Vec<_>>()
            .join("  "),
        Block::Numbered(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| format!("{:02}  {}", index + 1, escape_html(item.trim())))
            .collect::<Vec<_>>()
            .join("\n"),
        Block::Titled(items) => items
            .iter()
            .map(|(title, body)| {
                format!("<b>{}</b>\n{}", escape_html(title.trim()), escape_html(body.trim()))
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn block_plain(block: &Block) -> String {
    match block {
        Block::Paragraph(text) => text.trim().to_string(),
        Block::Emphasis(text) => format!("“{}”", text.trim()),
        Block::Tags(tags) => tags
            .iter()
            .map(|tag| format!("#{}", tag.trim()))
            .collect::<Vec<_>>()
            .join("  "),
        Block::Numbered(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| format!("{:02}  {}", index + 1, item.trim()))
            .collect::<Vec<_>>()
            .join("\n"),
        Block::Titled(items) => items
            .iter()
            .map(|(title, body)| format!("[{}]\n{}", title.trim(), body.trim()))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

/// Telegram HTML, one string per section. The headline block comes first.
pub fn render_html_sections(result: &AnalysisResult, input: &UserInput) -> Vec<String> {
    let (headline, subheadline, sections) = layout(result, input);
    let mut rendered = vec![format!(
        "<b>{}</b>\n<i>{}</i>",
        escape_html(headline.trim()),
        escape_html(subheadline.trim())
    )];
    for section in sections {
        let body = section
            .blocks
            .iter()
            .map(block_html)
            .filter(|block| !block.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        rendered.push(format!("<b>▌{}</b>\n{}", section.label, body));
    }
    rendered
}

pub fn render_plain(result: &AnalysisResult, input: &UserInput) -> String {
    let (headline, subheadline, sections) = layout(result, input);
    let rule = "━".repeat(24);
    let mut out = format!("{}\n{}\n{}\n", headline.trim(), subheadline.trim(), rule);
    for section in sections {
        out.push_str(&format!("\n■ {}\n", section.label));
        for block in &section.blocks {
            let text = block_plain(block);
            if !text.is_empty() {
                out.push_str(&text);
                out.push('\n');
            }
        }
    }
    out
}

/// Breaks HTML into tags, entities and single characters so that a cut never
/// lands inside one of them.
fn html_tokens(html: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = html;
    while let Some(first) = rest.chars().next() {
        let len = match first {
            '<' => rest.find('>').map(|end| end + 1),
            '&' => rest
                .char_indices()
                .take(10)
                .find(|(_, ch)| *ch == ';')
                .map(|(end, _)| end + 1),
            _ => None,
        }
        .unwrap_or(first.len_utf8());
        let (token, tail) = rest.split_at(len);
        tokens.push(token);
        rest = tail;
    }
    tokens
}

fn tag_name(tag: &str) -> &str {
    tag.trim_start_matches("</")
        .trim_start_matches('<')
        .trim_end_matches('>')
        .split_whitespace()
        .next()
        .unwrap_or_default()
}

/// Cuts one oversized HTML section into pieces of at most `limit` characters.
/// Tags still open at a cut are closed and reopened in the next piece.
fn cut_html(section: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut open: Vec<&str> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut reopened_len = 0;

    for token in html_tokens(section) {
        let is_close = token.starts_with("</");
        let is_open = !is_close && token.starts_with('<') && token.ends_with('>');
        let token_len = token.chars().count();
        let mut closing_len: usize = open.iter().map(|tag| tag_name(tag).len() + 3).sum();
        if is_open {
            closing_len += tag_name(token).len() + 3;
        } else if is_close && open.iter().any(|tag| tag_name(tag) == tag_name(token)) {
            closing_len -= tag_name(token).len() + 3;
        }

        if current_len + token_len + closing_len > limit && current_len > reopened_len {
            for tag in open.iter().rev() {
                current.push_str(&format!("</{}>", tag_name(tag)));
            }
            pieces.push(std::mem::take(&mut current));
            current = open.concat();
            current_len = current.chars().count();
            reopened_len = current_len;
        }

        current.push_str(token);
        current_len += token_len;
        if is_open {
            open.push(token);
        } else if is_close {
            let name = tag_name(token);
            if let Some(index) = open.iter().rposition(|tag| tag_name(tag) == name) {
                open.remove(index);
            }
        }
    }

    if current_len > reopened_len {
        pieces.push(current);
    }
    pieces
}

/// Drops tags and decodes entities, for resending a chunk without markup.
pub fn html_to_plain(html: &str) -> String {
    html_tokens(html)
        .into_iter()
        .filter(|token| !(token.starts_with('<') && token.ends_with('>')))
        .map(|token| match token {
            "&amp;" => "&",
            "&lt;" => "<",
            "&gt;" => ">",
            "&quot;" => "\"",
            other => other,
        })
        .collect()
}

/// Packs sections into messages under `limit` characters. A section that is
/// too long on its own is cut between tags and entities.
pub fn split_for_telegram(sections: &[String], limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for section in sections {
        let pieces = if section.chars().count() > limit {
            cut_html(section, limit)
        } else {
            vec![section.clone()]
        };

        for piece in pieces {
            let joined_len = current.chars().count() + 2 + piece.chars().count();
            if !current.is_empty() && joined_len > limit {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&piece);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
