/// Paint command set and colour handling for the report surface

use super::layout::{ElementType, LayoutTree};

/// An sRGB colour with straight (non-premultiplied) alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

impl Rgba {
    pub const BLACK: Rgba = Rgba(0, 0, 0, 255);
    pub const WHITE: Rgba = Rgba(255, 255, 255, 255);
    pub const TRANSPARENT: Rgba = Rgba(0, 0, 0, 0);

    /// Parse a CSS colour value.
    ///
    /// Supports `#rgb`, `#rrggbb`, `#rrggbbaa` and a handful of keywords used
    /// by the report templates. Returns `None` for anything else.
    pub fn parse(value: &str) -> Option<Rgba> {
        let v = value.trim().to_ascii_lowercase();
        match v.as_str() {
            "black" => return Some(Rgba::BLACK),
            "white" => return Some(Rgba::WHITE),
            "transparent" => return Some(Rgba::TRANSPARENT),
            "red" => return Some(Rgba(255, 0, 0, 255)),
            "green" => return Some(Rgba(0, 128, 0, 255)),
            "blue" => return Some(Rgba(0, 0, 255, 255)),
            "gray" | "grey" => return Some(Rgba(128, 128, 128, 255)),
            _ => {}
        }

        let hex = v.strip_prefix('#')?;
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|n| n * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        if !hex.is_ascii() {
            return None;
        }
        match hex.len() {
            3 => Some(Rgba(nibble(0)?, nibble(1)?, nibble(2)?, 255)),
            6 => Some(Rgba(byte(0)?, byte(2)?, byte(4)?, 255)),
            8 => Some(Rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }

    /// The same colour with alpha forced to 255.
    pub fn opaque(self) -> Rgba {
        Rgba(self.0, self.1, self.2, 255)
    }

    /// Source-over composite `self` onto an opaque destination pixel.
    pub fn over(self, dst: [u8; 3]) -> [u8; 3] {
        let a = self.3 as u32;
        let inv = 255 - a;
        let mix = |s: u8, d: u8| ((s as u32 * a + d as u32 * inv + 127) / 255) as u8;
        [mix(self.0, dst[0]), mix(self.1, dst[1]), mix(self.2, dst[2])]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: Rgba,
    },
    Text {
        x: i32,
        y: i32,
        text: String,
        scale: u32,
        rgba: Rgba,
    },
}

/// Placeholder fill for `<img>` boxes; image decoding is out of scope for the surface.
const IMAGE_PLACEHOLDER: Rgba = Rgba(203, 213, 225, 255);

/// Turn a layout tree into an ordered display list (painter's order).
pub fn paint_layout(tree: &LayoutTree) -> Vec<PaintCommand> {
    let mut cmds = Vec::with_capacity(tree.nodes.len());
    for node in &tree.nodes {
        let r = &node.lb.rect;
        if let Some(bg) = node.style.background {
            if bg.3 > 0 && r.width > 0 && r.height > 0 {
                cmds.push(PaintCommand::SolidRect {
                    x: r.x,
                    y: r.y,
                    width: r.width,
                    height: r.height,
                    rgba: bg,
                });
            }
        }
        match node.elem_type {
            ElementType::Image => cmds.push(PaintCommand::SolidRect {
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
                rgba: IMAGE_PLACEHOLDER,
            }),
            ElementType::Title | ElementType::Paragraph if !node.text.is_empty() => {
                let pad = node.lb.box_model.padding as i32;
                cmds.push(PaintCommand::Text {
                    x: r.x + pad,
                    y: r.y + pad,
                    text: node.text.clone(),
                    scale: node.scale,
                    rgba: node.style.color,
                });
            }
            _ => {}
        }
    }
    cmds
}
