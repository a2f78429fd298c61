use std::collections::BTreeMap;

use plotters::style::RGBColor;

use crate::error::{ChainsError, Result};
use crate::{Alphabet, TraitId};

const NAMED_COLORS: &[(&str, (u8, u8, u8))] = &[
    ("black", (0, 0, 0)),
    ("white", (255, 255, 255)),
    ("red", (255, 0, 0)),
    ("green", (0, 128, 0)),
    ("blue", (0, 0, 255)),
    ("yellow", (255, 255, 0)),
    ("cyan", (0, 255, 255)),
    ("magenta", (255, 0, 255)),
    ("grey", (128, 128, 128)),
    ("gray", (128, 128, 128)),
    ("lightgrey", (211, 211, 211)),
    ("lightgray", (211, 211, 211)),
    ("darkgrey", (169, 169, 169)),
    ("darkgray", (169, 169, 169)),
    ("salmon", (250, 128, 114)),
    ("orange", (255, 165, 0)),
    ("purple", (128, 0, 128)),
    ("brown", (165, 42, 42)),
    ("pink", (255, 192, 203)),
    ("navy", (0, 0, 128)),
    ("teal", (0, 128, 128)),
];

fn parse_hex(hex: &str) -> Option<RGBColor> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some(RGBColor(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        3 => {
            let short = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
            Some(RGBColor(short(0)?, short(1)?, short(2)?))
        }
        _ => None,
    }
}

/// Parses `#rrggbb`, `#rgb`, or one of the named colors.
pub fn parse_color(value: &str) -> Result<RGBColor> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex)
            .ok_or_else(|| ChainsError::invalid(format!("malformed hex color '{value}'")));
    }
    let lower = value.to_ascii_lowercase();
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|&(_, (r, g, b))| RGBColor(r, g, b))
        .ok_or_else(|| ChainsError::invalid(format!("unrecognized color '{value}'")))
}

/// Trait → fill color, shared by the lineage and trajectory panels.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    colors: Vec<RGBColor>,
}

impl Palette {
    /// Every alphabet label needs a color, and every key must be a label.
    pub fn new(alphabet: &Alphabet, colors: &BTreeMap<String, String>) -> Result<Self> {
        if let Some(stray) = colors.keys().find(|k| alphabet.id_of(k).is_err()) {
            return Err(ChainsError::invalid(format!(
                "color given for unknown trait '{stray}'"
            )));
        }
        let colors = alphabet
            .labels()
            .iter()
            .map(|label| {
                let value = colors
                    .get(label)
                    .ok_or_else(|| ChainsError::invalid(format!("no color for trait '{label}'")))?;
                parse_color(value)
            })
            .collect::<Result<_>>()?;
        Ok(Self { colors })
    }

    pub fn color(&self, id: TraitId) -> RGBColor {
        self.colors[id]
    }
}
