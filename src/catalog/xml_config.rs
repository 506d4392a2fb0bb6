use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const COLORSPACE_TAG: &[u8] = b"colorspace";

// Top-level siblings are accepted: fragments such as
// `<colorspace name="a"/><colorspace name="b"/>` are common in hand-written configs.
pub(super) fn colorspace_names(raw: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut names = Vec::new();
    let mut depth = 0usize;
    let mut saw_element = false;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("at byte {}: {e}", reader.buffer_position()))?;
        match event {
            Event::Start(start) => {
                saw_element = true;
                depth += 1;
                push_colorspace_name(&start, &mut names)?;
            }
            Event::Empty(start) => {
                saw_element = true;
                push_colorspace_name(&start, &mut names)?;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_element {
        return Err(String::from("document contains no elements"));
    }
    if depth != 0 {
        return Err(format!("{depth} element(s) left unclosed at end of document"));
    }
    Ok(names)
}

fn push_colorspace_name(start: &BytesStart<'_>, names: &mut Vec<String>) -> Result<(), String> {
    if start.local_name().as_ref() != COLORSPACE_TAG {
        return Ok(());
    }
    let Some(attr) = start
        .try_get_attribute("name")
        .map_err(|e| format!("invalid colorspace attribute: {e}"))?
    else {
        return Ok(());
    };
    let name = attr
        .unescape_value()
        .map_err(|e| format!("invalid colorspace name: {e}"))?;
    let name = name.trim();
    if !name.is_empty() {
        names.push(name.to_string());
    }
    Ok(())
}
