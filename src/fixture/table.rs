//! Per-pass fragment tables
//!
//! Columns: `id,string,boundingBox,rect`. Boxes are written as
//! `x,y,width,height`; `boundingBox` is normalized to the image and `rect` is
//! in viewport coordinates.

use std::io::{Read, Write};
use uuid::Uuid;

use super::FixtureError;
use crate::vision::{PassKind, Rect, TextFragment};

pub const FRAGMENT_HEADER: [&str; 4] = ["id", "string", "boundingBox", "rect"];

pub fn write_fragments<W: Write>(
    writer: W,
    fragments: &[TextFragment],
) -> Result<(), FixtureError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(FRAGMENT_HEADER)?;
    for fragment in fragments {
        wtr.write_record([
            fragment.id.to_string(),
            fragment.text.clone(),
            fragment.normalized_box.to_table_string(),
            fragment.content_rect.to_table_string(),
        ])?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Read a fragment table back, tagging every fragment with `pass`
pub fn read_fragments<R: Read>(
    reader: R,
    pass: PassKind,
) -> Result<Vec<TextFragment>, FixtureError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut fragments = Vec::new();

    for record in rdr.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or_default();
        let invalid = |reason: String| FixtureError::InvalidRow {
            attribute: format!("{} fragment", pass.display_name()),
            reason,
        };

        let id = Uuid::parse_str(field(0))
            .map_err(|e| invalid(format!("bad id `{}`: {}", field(0), e)))?;
        let normalized_box = Rect::from_table_string(field(2))
            .ok_or_else(|| invalid(format!("bad bounding box `{}`", field(2))))?;
        let content_rect = Rect::from_table_string(field(3))
            .ok_or_else(|| invalid(format!("bad rect `{}`", field(3))))?;

        fragments.push(TextFragment {
            id,
            pass,
            text: field(1).to_string(),
            normalized_box,
            content_rect,
        });
    }
    Ok(fragments)
}
