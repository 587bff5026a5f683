use pdfscope_core::WordToken;

pub const X_TOLERANCE: f64 = 3.0;
pub const Y_TOLERANCE: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CharBox {
    pub ch: char,
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl CharBox {
    /// Converts a box given in PDF user space (bottom-left origin) on a page `page_height`
    /// units tall.
    pub fn from_pdf_space(
        ch: char,
        left: f64,
        bottom: f64,
        right: f64,
        top: f64,
        page_height: f64,
    ) -> Self {
        Self {
            ch,
            x0: left.min(right),
            top: page_height - top.max(bottom),
            x1: left.max(right),
            bottom: page_height - top.min(bottom),
        }
    }
}

/// Groups characters into words.
///
/// Characters are ordered by line, then left to right. Whitespace ends a word, as does a
/// horizontal gap wider than [`X_TOLERANCE`] or a jump in `top` larger than [`Y_TOLERANCE`].
/// A word's box is the union of its characters' boxes.
pub fn group_words(chars: &[CharBox]) -> Vec<WordToken> {
    let mut ordered: Vec<&CharBox> = chars.iter().collect();
    ordered.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.x0.total_cmp(&b.x0)));
    let ordered = order_by_line(ordered);

    let mut words = Vec::new();
    let mut current: Vec<&CharBox> = Vec::new();
    for ch in ordered {
        if ch.ch.is_whitespace() || ch.ch.is_control() {
            flush(&mut current, &mut words);
            continue;
        }
        if let Some(last) = current.last() {
            let gap = (last.x0.max(ch.x0) - last.x1.min(ch.x1)).max(0.0);
            if gap > X_TOLERANCE || (ch.top - last.top).abs() > Y_TOLERANCE {
                flush(&mut current, &mut words);
            }
        }
        current.push(ch);
    }
    flush(&mut current, &mut words);
    words
}

fn order_by_line(sorted: Vec<&CharBox>) -> Vec<&CharBox> {
    let mut lines: Vec<Vec<&CharBox>> = Vec::new();
    for ch in sorted {
        match lines.last_mut() {
            Some(line) if (ch.top - line[0].top).abs() <= Y_TOLERANCE => line.push(ch),
            _ => lines.push(vec![ch]),
        }
    }
    lines
        .into_iter()
        .flat_map(|mut line| {
            line.sort_by(|a, b| a.x0.total_cmp(&b.x0));
            line
        })
        .collect()
}

fn flush(current: &mut Vec<&CharBox>, words: &mut Vec<WordToken>) {
    if current.is_empty() {
        return;
    }
    let text: String = current.iter().map(|c| c.ch).collect();
    let x0 = current.iter().map(|c| c.x0).fold(f64::INFINITY, f64::min);
    let top = current.iter().map(|c| c.top).fold(f64::INFINITY, f64::min);
    let x1 = current.iter().map(|c| c.x1).fold(f64::NEG_INFINITY, f64::max);
    let bottom = current
        .iter()
        .map(|c| c.bottom)
        .fold(f64::NEG_INFINITY, f64::max);
    words.push(WordToken::new(text, x0, top, x1, bottom));
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyphs(text: &str, x: f64, top: f64, advance: f64) -> Vec<CharBox> {
        text.chars()
            .enumerate()
            .map(|(i, ch)| {
                let x0 = x + i as f64 * advance;
                CharBox {
                    ch,
                    x0,
                    top,
                    x1: x0 + advance,
                    bottom: top + 10.0,
                }
            })
            .collect()
    }

    #[test]
    fn splits_on_whitespace() {
        let words = group_words(&glyphs("Hi there", 10.0, 20.0, 5.0));
        let text: Vec<_> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(text, ["Hi", "there"]);
        assert_eq!(words[0].x0, 10.0);
        assert_eq!(words[0].x1, 20.0);
        assert_eq!(words[1].x0, 25.0);
        assert_eq!(words[1].bottom, 30.0);
    }

    #[test]
    fn splits_on_wide_gap() {
        let mut chars = glyphs("ab", 10.0, 20.0, 5.0);
        chars.extend(glyphs("cd", 23.5, 20.0, 5.0));
        let words = group_words(&chars);
        assert_eq!(words.len(), 2);

        let mut chars = glyphs("ab", 10.0, 20.0, 5.0);
        chars.extend(glyphs("cd", 22.0, 20.0, 5.0));
        assert_eq!(group_words(&chars)[0].text, "abcd");
    }

    #[test]
    fn lines_are_ordered_top_to_bottom() {
        let mut chars = glyphs("lower", 10.0, 60.0, 5.0);
        chars.extend(glyphs("upper", 10.0, 20.0, 5.0));
        chars.extend(glyphs("right", 50.0, 21.0, 5.0));
        let words = group_words(&chars);
        let text: Vec<_> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(text, ["upper", "right", "lower"]);
    }

    #[test]
    fn pdf_space_flips_vertical_axis() {
        let ch = CharBox::from_pdf_space('x', 10.0, 680.0, 16.0, 692.0, 792.0);
        assert_eq!(ch.x0, 10.0);
        assert_eq!(ch.x1, 16.0);
        assert_eq!(ch.top, 100.0);
        assert_eq!(ch.bottom, 112.0);
    }

    #[test]
    fn empty_input_yields_no_words() {
        assert!(group_words(&[]).is_empty());
        assert!(group_words(&glyphs("   ", 0.0, 0.0, 5.0)).is_empty());
    }
}
