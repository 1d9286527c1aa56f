//! Block layout for report documents
//!
//! Report pages are vertical stacks of cards, headings and paragraphs, so a
//! block-only flow is enough: every element occupies the full content width of
//! its container and children stack top to bottom. The layout always runs to
//! the element's full scroll height; clipping to a viewport is the caller's
//! decision.

use super::paint::Rgba;
use scraper::ElementRef;

/// Width of one glyph cell in CSS pixels at scale 1.
pub const CHAR_WIDTH: u32 = 8;
/// Height of one text line in CSS pixels at scale 1.
pub const LINE_HEIGHT: u32 = 10;
/// Vertical gap between sibling blocks.
pub const BLOCK_GAP: u32 = 6;

const DEFAULT_IMAGE_HEIGHT: u32 = 48;

#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxModel {
    pub padding: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    pub rect: Rect,
    pub box_model: BoxModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Title,
    Paragraph,
    Block,
    Image,
}

/// The subset of inline CSS the report surface understands.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStyle {
    pub background: Option<Rgba>,
    pub color: Rgba,
    pub display_none: bool,
    pub height: Option<u32>,
    /// `transform: translate*()` offset in CSS pixels.
    pub translate: (i32, i32),
}

impl BoxStyle {
    fn inherit(color: Rgba) -> Self {
        Self {
            background: None,
            color,
            display_none: false,
            height: None,
            translate: (0, 0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayoutNode {
    pub lb: LayoutBox,
    pub text: String,
    pub elem_type: ElementType,
    pub scale: u32,
    pub style: BoxStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutOptions {
    pub width: u32,
    /// Ignore CSS transforms so elements are captured at their flow position.
    pub neutralize_transforms: bool,
}

/// Laid-out subtree of one element.
#[derive(Debug, Clone)]
pub struct LayoutTree {
    pub nodes: Vec<LayoutNode>,
    pub width: u32,
    /// Full content height, independent of any viewport. Content overflowing
    /// a declared `height` still counts.
    pub scroll_height: u32,
}

/// Parse an inline `style` attribute on top of inherited values.
pub fn parse_inline_style(style: &str, inherited_color: Rgba) -> BoxStyle {
    let mut out = BoxStyle::inherit(inherited_color);
    for decl in style.split(';') {
        let Some((prop, value)) = decl.split_once(':') else {
            continue;
        };
        let prop = prop.trim().to_ascii_lowercase();
        let value = value.trim();
        match prop.as_str() {
            "background" | "background-color" => out.background = Rgba::parse(value),
            "color" => {
                if let Some(c) = Rgba::parse(value) {
                    out.color = c;
                }
            }
            "display" => out.display_none = value.eq_ignore_ascii_case("none"),
            "height" => out.height = parse_px(value).map(|v| v.max(0) as u32),
            "transform" => out.translate = parse_translate(value).unwrap_or((0, 0)),
            _ => {}
        }
    }
    out
}

fn parse_px(value: &str) -> Option<i32> {
    let v = value.trim();
    let num = v.strip_suffix("px").unwrap_or(v).trim();
    num.parse::<f32>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i32)
}

/// Parse `translate(x, y)`, `translateX(x)`, `translateY(y)` and `none`.
fn parse_translate(value: &str) -> Option<(i32, i32)> {
    let v = value.trim().to_ascii_lowercase();
    if v == "none" {
        return Some((0, 0));
    }
    let open = v.find('(')?;
    let close = v.rfind(')')?;
    if close < open {
        return None;
    }
    let func = v[..open].trim();
    let args: Vec<i32> = v[open + 1..close]
        .split(',')
        .map(parse_px)
        .collect::<Option<Vec<_>>>()?;
    match (func, args.as_slice()) {
        ("translate", [x]) => Some((*x, 0)),
        ("translate", [x, y]) => Some((*x, *y)),
        ("translatex", [x]) => Some((*x, 0)),
        ("translatey", [y]) => Some((0, *y)),
        _ => None,
    }
}

/// Greedy word wrap at `chars_per_line`; overlong words are split.
pub fn wrap_text(text: &str, chars_per_line: usize) -> Vec<String> {
    let chars_per_line = chars_per_line.max(1);
    let mut lines = Vec::new();
    let mut cur = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > chars_per_line {
            if !cur.is_empty() {
                lines.push(std::mem::take(&mut cur));
            }
            let rest = word.split_off(chars_per_line);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let cur_len = cur.chars().count();
        if !cur.is_empty() && cur_len + word.len() + 1 > chars_per_line {
            lines.push(std::mem::take(&mut cur));
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.extend(word);
    }
    if !cur.is_empty() {
        lines.push(cur);
    }
    lines
}

enum Kind {
    Skip,
    Leaf(ElementType, u32),
    Image,
    Rule,
    Container,
}

fn classify(tag: &str) -> Kind {
    match tag {
        "script" | "style" | "head" | "template" | "title" | "meta" | "link" | "noscript"
        | "br" => Kind::Skip,
        "h1" | "h2" => Kind::Leaf(ElementType::Title, 2),
        "h3" | "h4" | "h5" | "h6" => Kind::Leaf(ElementType::Title, 1),
        "p" | "li" | "span" | "a" | "label" | "strong" | "em" | "b" | "i" | "small"
        | "button" | "td" | "th" | "dt" | "dd" | "figcaption" | "blockquote" | "pre"
        | "code" => Kind::Leaf(ElementType::Paragraph, 1),
        "img" | "svg" | "canvas" | "video" => Kind::Image,
        "hr" => Kind::Rule,
        _ => Kind::Container,
    }
}

struct Flow<'a> {
    opts: &'a LayoutOptions,
    nodes: Vec<LayoutNode>,
    /// Lowest untransformed bottom edge of any placed box.
    content_bottom: i32,
}

impl Flow<'_> {
    /// Lay out `el` with its top-left corner at (`x`, `y`); returns the height consumed.
    fn block(&mut self, el: ElementRef, x: i32, y: i32, width: u32, color: Rgba, offset: (i32, i32)) -> u32 {
        let tag = el.value().name();
        let kind = classify(tag);
        if matches!(kind, Kind::Skip) {
            return 0;
        }
        let style = parse_inline_style(el.value().attr("style").unwrap_or(""), color);
        if style.display_none {
            return 0;
        }
        let offset = if self.opts.neutralize_transforms {
            offset
        } else {
            (offset.0 + style.translate.0, offset.1 + style.translate.1)
        };

        match kind {
            Kind::Leaf(elem_type, scale) => {
                let text = el.text().collect::<String>();
                self.leaf(&text, elem_type, scale, x, y, width, style, offset)
            }
            Kind::Image => {
                let attr_px = |name: &str| el.value().attr(name).and_then(parse_px).map(|v| v.max(0) as u32);
                let height = style.height.or_else(|| attr_px("height")).unwrap_or(DEFAULT_IMAGE_HEIGHT);
                let img_width = attr_px("width").map(|w| w.min(width)).unwrap_or(width);
                self.push(x, y, img_width, height, 0, String::new(), ElementType::Image, 1, style, offset);
                height
            }
            Kind::Rule => {
                let mut style = style;
                style.background.get_or_insert(Rgba(226, 232, 240, 255));
                self.push(x, y, width, 1, 0, String::new(), ElementType::Block, 1, style, offset);
                1
            }
            Kind::Container => self.container(el, x, y, width, style, offset),
            Kind::Skip => 0,
        }
    }

    fn container(&mut self, el: ElementRef, x: i32, y: i32, width: u32, style: BoxStyle, offset: (i32, i32)) -> u32 {
        let padding = if style.background.is_some() { 8 } else { 0 };
        let slot = self.nodes.len();
        let declared = style.height;
        let color = style.color;
        self.push(x, y, width, 0, padding, String::new(), ElementType::Block, 1, style, offset);

        let inner_x = x + padding as i32;
        let inner_w = width.saturating_sub(padding * 2);
        let mut cursor = y + padding as i32;
        let mut placed_any = false;
        for child in el.children() {
            let used = if let Some(child_el) = ElementRef::wrap(child) {
                let top = cursor + if placed_any { BLOCK_GAP as i32 } else { 0 };
                let h = self.block(child_el, inner_x, top, inner_w, color, offset);
                if h > 0 { Some((top, h)) } else { None }
            } else if let Some(text) = child.value().as_text() {
                if text.trim().is_empty() {
                    None
                } else {
                    let top = cursor + if placed_any { BLOCK_GAP as i32 } else { 0 };
                    let anon = BoxStyle::inherit(color);
                    let h = self.leaf(text, ElementType::Paragraph, 1, inner_x, top, inner_w, anon, offset);
                    if h > 0 { Some((top, h)) } else { None }
                }
            } else {
                None
            };
            if let Some((top, h)) = used {
                cursor = top + h as i32;
                placed_any = true;
            }
        }

        let content = (cursor - (y + padding as i32)).max(0) as u32;
        let natural = content + padding * 2;
        let height = declared.unwrap_or(natural);
        if height == 0 {
            self.nodes.remove(slot);
        } else {
            self.nodes[slot].lb.rect.height = height;
            self.content_bottom = self.content_bottom.max(y + height.max(natural) as i32);
        }
        height
    }

    #[allow(clippy::too_many_arguments)]
    fn leaf(&mut self, raw: &str, elem_type: ElementType, scale: u32, x: i32, y: i32, width: u32, style: BoxStyle, offset: (i32, i32)) -> u32 {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() && style.height.is_none() {
            return 0;
        }
        let padding = if elem_type == ElementType::Title { 8 } else { 6 };
        let content_w = width.saturating_sub(padding * 2);
        let chars_per_line = (content_w / (CHAR_WIDTH * scale)).max(1) as usize;
        let lines = wrap_text(&normalized, chars_per_line);
        let text_h = lines.len() as u32 * LINE_HEIGHT * scale;
        let height = style.height.unwrap_or(text_h + padding * 2);
        self.push(x, y, width, height, padding, lines.join("\n"), elem_type, scale, style, offset);
        height
    }

    #[allow(clippy::too_many_arguments)]
    fn push(&mut self, x: i32, y: i32, width: u32, height: u32, padding: u32, text: String, elem_type: ElementType, scale: u32, style: BoxStyle, offset: (i32, i32)) {
        if height > 0 {
            self.content_bottom = self.content_bottom.max(y + height as i32);
        }
        self.nodes.push(LayoutNode {
            lb: LayoutBox {
                rect: Rect {
                    x: x + offset.0,
                    y: y + offset.1,
                    width,
                    height,
                },
                box_model: BoxModel { padding },
            },
            text,
            elem_type,
            scale,
            style,
        });
    }
}

/// Compute the block layout of `root` and its subtree at `opts.width`.
///
/// The root is placed at the origin. The returned `scroll_height` is the
/// larger of the root's box height and the bottom of its laid-out content, so
/// a fixed-height scroll container reports everything it can scroll to.
pub fn layout_element(root: ElementRef, opts: &LayoutOptions) -> LayoutTree {
    let mut flow = Flow {
        opts,
        nodes: Vec::new(),
        content_bottom: 0,
    };
    let box_height = flow.block(root, 0, 0, opts.width, Rgba(15, 23, 42, 255), (0, 0));
    LayoutTree {
        scroll_height: box_height.max(flow.content_bottom.max(0) as u32),
        nodes: flow.nodes,
        width: opts.width,
    }
}
