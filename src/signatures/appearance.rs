//! Visible appearance of the signature widget.
//!
//! A Form XObject with a thin border and the label lines in Helvetica,
//! the last line being the signing time. The appearance is cosmetic: it is
//! covered by the signature like every other byte but never checked.

use crate::object::{Dictionary, Object};
use crate::signatures::types::SignaturePlacement;
use crate::writer::ObjectSerializer;
use chrono::{DateTime, Utc};

/// Leading as a multiple of the font size.
const LINE_SPACING: f64 = 1.2;
const PADDING: f64 = 4.0;

/// Timestamp format shown in the widget.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Builder for the signature widget's normal appearance.
#[derive(Debug, Clone)]
pub struct SignatureAppearance {
    width: f64,
    height: f64,
    font_size: f64,
    lines: Vec<String>,
}

impl SignatureAppearance {
    /// Appearance for `placement`, stamped with `signing_time`.
    pub fn new(placement: &SignaturePlacement, signing_time: DateTime<Utc>) -> Self {
        let mut lines: Vec<String> = placement
            .label
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        lines.push(signing_time.format(TIMESTAMP_FORMAT).to_string());

        Self {
            width: placement.width.max(0.0),
            height: placement.height.max(0.0),
            font_size: placement.font_size,
            lines,
        }
    }

    /// Text lines, timestamp last.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Font size after shrinking the text to fit the box height.
    pub fn effective_font_size(&self) -> f64 {
        let fit = (self.height - 2.0 * PADDING) / (self.lines.len() as f64 * LINE_SPACING);
        self.font_size.min(fit).max(1.0)
    }

    /// Content stream operators.
    pub fn content(&self) -> Vec<u8> {
        let size = self.effective_font_size();
        let leading = size * LINE_SPACING;
        let mut s = String::new();

        s.push_str("q\n0.5 w 0 G\n");
        s.push_str(&format!("0.25 0.25 {} {} re S\n", fmt(self.width - 0.5), fmt(self.height - 0.5)));
        s.push_str("BT\n0 g\n");
        s.push_str(&format!("/Helv {} Tf\n{} TL\n", fmt(size), fmt(leading)));
        s.push_str(&format!("{} {} Td\n", fmt(PADDING), fmt(self.height - PADDING - size)));
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                s.push_str("T*\n");
            }
            s.push_str(&format!("({}) Tj\n", escape_text(line)));
        }
        s.push_str("ET\nQ\n");

        s.into_bytes()
    }

    /// Form XObject stream.
    pub fn to_object(&self) -> Object {
        let mut font = Dictionary::new();
        font.insert("Type".to_string(), ObjectSerializer::name("Font"));
        font.insert("Subtype".to_string(), ObjectSerializer::name("Type1"));
        font.insert("BaseFont".to_string(), ObjectSerializer::name("Helvetica"));
        font.insert("Encoding".to_string(), ObjectSerializer::name("WinAnsiEncoding"));

        let mut fonts = Dictionary::new();
        fonts.insert("Helv".to_string(), Object::Dictionary(font));
        let mut resources = Dictionary::new();
        resources.insert("Font".to_string(), Object::Dictionary(fonts));

        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), ObjectSerializer::name("XObject"));
        dict.insert("Subtype".to_string(), ObjectSerializer::name("Form"));
        dict.insert("FormType".to_string(), ObjectSerializer::integer(1));
        dict.insert("BBox".to_string(), ObjectSerializer::rect([0.0, 0.0, self.width, self.height]));
        dict.insert("Resources".to_string(), Object::Dictionary(resources));

        Object::Stream {
            dict,
            data: bytes::Bytes::from(self.content()),
        }
    }
}

fn fmt(value: f64) -> String {
    ObjectSerializer::new().serialize_to_string(&Object::Real(value))
}

/// Escape for a literal string. Characters outside Latin-1 become `?`.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            },
            ' '..='~' => out.push(c),
            '\u{a0}'..='\u{ff}' => out.push_str(&format!("\\{:03o}", c as u32)),
            _ => out.push('?'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 2).unwrap()
    }

    #[test]
    fn test_lines_end_with_timestamp() {
        let appearance = SignatureAppearance::new(&SignaturePlacement::default(), time());
        assert_eq!(
            appearance.lines(),
            &["Digitally signed by", "Signing service", "07/03/2026 09:05:02"]
        );
    }

    #[test]
    fn test_content_stream() {
        let appearance = SignatureAppearance::new(&SignaturePlacement::default(), time());
        let content = String::from_utf8(appearance.content()).unwrap();
        assert!(content.contains("/Helv 10 Tf"));
        assert!(content.contains("(Digitally signed by) Tj"));
        assert!(content.contains("(07/03/2026 09:05:02) Tj"));
        assert_eq!(content.matches("T*").count(), 2);
    }

    #[test]
    fn test_font_shrinks_to_fit() {
        let placement = SignaturePlacement {
            height: 20.0,
            ..SignaturePlacement::default()
        };
        let appearance = SignatureAppearance::new(&placement, time());
        assert!(appearance.effective_font_size() < 10.0);
        assert!(appearance.effective_font_size() * 1.2 * 3.0 <= 12.0 + 1e-9);
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a (b) \\"), "a \\(b\\) \\\\");
        assert_eq!(escape_text("Zürich"), "Z\\374rich");
        assert_eq!(escape_text("签名"), "??");
    }

    #[test]
    fn test_xobject_dictionary() {
        let appearance = SignatureAppearance::new(&SignaturePlacement::default(), time());
        let obj = appearance.to_object();
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict["Subtype"].as_name(), Some("Form"));
        assert_eq!(
            dict["BBox"],
            ObjectSerializer::rect([0.0, 0.0, 160.0, 80.0])
        );
        let resources = dict["Resources"].as_dict().unwrap();
        let helv = resources["Font"].as_dict().unwrap()["Helv"].as_dict().unwrap();
        assert_eq!(helv["BaseFont"].as_name(), Some("Helvetica"));
    }
}
